use crate::error::CryptoError;

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn encode(label: &str, der: &[u8]) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(&pem, pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF))
}

/// Decode the first PEM block of `text`, returning its label and DER contents.
pub fn decode(text: &str) -> Result<(String, Vec<u8>), CryptoError> {
    let pem = pem::parse(text)?;
    Ok((pem.tag().to_string(), pem.contents().to_vec()))
}

/// Decode a PEM block whose label must be one of `labels`.
pub fn decode_expecting(text: &str, labels: &[&str]) -> Result<Vec<u8>, CryptoError> {
    let (label, der) = decode(text)?;
    if !labels.contains(&label.as_str()) {
        return Err(CryptoError::DecodingError(format!(
            "expected PEM label {}, found {label:?}",
            labels.join(" or ")
        )));
    }
    Ok(der)
}
