//! Certificate serial numbers and the random serial allocator.

use std::fmt;
use std::str::FromStr;

use rand::TryRngCore;
use rand::rngs::OsRng;
use rsa::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;

/// Exclusive upper bound of allocated serials.
pub const SERIAL_UPPER_BOUND: u64 = 99_999_999_999;

/// RFC 5280 limits serial numbers to 20 octets, counting the DER sign octet.
pub const MAX_SERIAL_OCTETS: usize = 20;

/// The cryptographic serial of a certificate: an arbitrary-precision non-negative integer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SerialNumber(BigUint);

impl SerialNumber {
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        SerialNumber(BigUint::from_bytes_be(bytes))
    }

    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }

    /// Converts to the DER form used inside a certificate.
    ///
    /// Zero and values longer than [`MAX_SERIAL_OCTETS`] are rejected.
    pub fn to_x509(&self) -> Result<x509_cert::serial_number::SerialNumber, CryptoError> {
        let bytes = self.to_be_bytes();
        if bytes.iter().all(|b| *b == 0) {
            return Err(CryptoError::InvalidInput(
                "serial number must be positive".to_string(),
            ));
        }
        if bytes.len() > MAX_SERIAL_OCTETS {
            return Err(CryptoError::InvalidInput(format!(
                "serial number {self} is longer than {MAX_SERIAL_OCTETS} octets"
            )));
        }
        x509_cert::serial_number::SerialNumber::new(&bytes)
            .map_err(|e| CryptoError::InvalidInput(format!("serial number {self}: {e}")))
    }

    pub fn from_x509(serial: &x509_cert::serial_number::SerialNumber) -> Self {
        Self::from_be_bytes(serial.as_bytes())
    }
}

impl From<u64> for SerialNumber {
    fn from(value: u64) -> Self {
        SerialNumber(BigUint::from(value))
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SerialNumber {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(SerialNumber)
            .ok_or_else(|| CryptoError::InvalidInput(format!("not a decimal serial number: {s:?}")))
    }
}

impl Serialize for SerialNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SerialNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Draws a serial uniformly from `[1, SERIAL_UPPER_BOUND)` using the OS CSPRNG.
///
/// Serials are not coordinated with any ledger. Callers that need a hard
/// uniqueness guarantee should supply their own serial.
pub fn next_serial() -> Result<SerialNumber, CryptoError> {
    next_serial_from(&mut OsRng)
}

fn next_serial_from<R: TryRngCore>(rng: &mut R) -> Result<SerialNumber, CryptoError> {
    let span = SERIAL_UPPER_BOUND - 1;
    // Largest multiple of `span` that fits in a u64; draws at or above it are biased.
    let zone = u64::MAX - (u64::MAX % span);
    loop {
        let draw = rng
            .try_next_u64()
            .map_err(|e| CryptoError::RandomnessUnavailable(e.to_string()))?;
        if draw < zone {
            return Ok(SerialNumber::from(1 + draw % span));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    struct FailingRng;

    impl TryRngCore for FailingRng {
        type Error = std::io::Error;

        fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
            Err(std::io::Error::other("entropy source closed"))
        }

        fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
            Err(std::io::Error::other("entropy source closed"))
        }

        fn try_fill_bytes(&mut self, _dst: &mut [u8]) -> Result<(), Self::Error> {
            Err(std::io::Error::other("entropy source closed"))
        }
    }

    #[test]
    fn serials_are_in_range_and_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..1_000 {
            let serial = next_serial().unwrap();
            assert!(serial > SerialNumber::from(0));
            assert!(serial < SerialNumber::from(SERIAL_UPPER_BOUND));
            assert!(seen.insert(serial), "duplicate serial drawn");
        }
    }

    #[test]
    fn entropy_failure_is_reported() {
        assert!(matches!(
            next_serial_from(&mut FailingRng),
            Err(CryptoError::RandomnessUnavailable(_))
        ));
    }

    #[test]
    fn decimal_text_round_trips() {
        let serial: SerialNumber = "1234567890123456789012345".parse().unwrap();
        assert_eq!(serial.to_string(), "1234567890123456789012345");
        assert!("12a".parse::<SerialNumber>().is_err());
    }

    #[test]
    fn x509_form_rejects_zero_and_oversized() {
        assert!(SerialNumber::from(0).to_x509().is_err());
        assert!(SerialNumber::from_be_bytes(&[0xff; 21]).to_x509().is_err());

        let serial = SerialNumber::from(1653);
        let x509 = serial.to_x509().unwrap();
        assert_eq!(SerialNumber::from_x509(&x509), serial);

        let high_bit = SerialNumber::from_be_bytes(&[0x80; 8]);
        assert_eq!(SerialNumber::from_x509(&high_bit.to_x509().unwrap()), high_bit);
    }
}
