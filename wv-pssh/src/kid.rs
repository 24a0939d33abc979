use crate::{Error, Result};
use std::{fmt, str::FromStr};

/// A 128-bit content key id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyId([u8; 16]);

impl KeyId {
    /// Parse a key id from hex, with or without uuid style grouping.
    pub fn parse(raw: &str) -> Result<Self> {
        let hex32 = normalize_kid(raw)?;
        let mut bytes = [0_u8; 16];
        hex::decode_to_slice(&hex32, &mut bytes)
            .map_err(|_| Error::new_with_input("Key id is not valid hex", raw))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex without separators.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Lowercase hex grouped as `8-4-4-4-12`.
    pub fn uuid(&self) -> String {
        let hex = self.to_hex();
        format!(
            "{}-{}-{}-{}-{}",
            &hex[..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..]
        )
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for KeyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Strip grouping characters (`-`, braces and whitespace) from a key id and
/// return it as 32 lowercase hex characters.
///
/// Anything else that is not a hex digit, or a length other than 32 after
/// stripping, is rejected.
pub fn normalize_kid(raw: &str) -> Result<String> {
    let mut hex32 = String::with_capacity(32);

    for c in raw.chars() {
        match c {
            '-' | '{' | '}' => (),
            c if c.is_whitespace() => (),
            c if c.is_ascii_hexdigit() => hex32.push(c.to_ascii_lowercase()),
            _ => {
                return Err(Error::new_with_input(
                    format!("Key id contains non hex character '{}'", c),
                    raw,
                ));
            }
        }
    }

    if hex32.len() != 32 {
        return Err(Error::new_with_input(
            format!(
                "Key id must be 32 hex characters but {} were found",
                hex32.len()
            ),
            raw,
        ));
    }

    Ok(hex32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_uuid_grouping() {
        assert_eq!(
            normalize_kid("12345678-1234-1234-1234-123456789012").unwrap(),
            "12345678123412341234123456789012"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_kid("EB676ABB-CB34-5E96-BBCF-616630F1A3DA").unwrap();
        assert_eq!(once, "eb676abbcb345e96bbcf616630f1a3da");
        assert_eq!(normalize_kid(&once).unwrap(), once);
    }

    #[test]
    fn test_normalize_braced_guid() {
        assert_eq!(
            normalize_kid("{eb676abb-cb34-5e96-bbcf-616630f1a3da}").unwrap(),
            "eb676abbcb345e96bbcf616630f1a3da"
        );
    }

    #[test]
    fn test_reject_wrong_length() {
        let err = normalize_kid("12345678-1234").unwrap_err();
        assert_eq!(err.input(), Some("12345678-1234"));
        assert!(normalize_kid("12345678123412341234123456789012ab").is_err());
        assert!(normalize_kid("").is_err());
    }

    #[test]
    fn test_reject_non_hex() {
        assert!(normalize_kid("1234567g123412341234123456789012").is_err());
        assert!(normalize_kid("12345678_1234_1234_1234_123456789012").is_err());
    }

    #[test]
    fn test_key_id_uuid() {
        let kid = KeyId::parse("eb676abbcb345e96bbcf616630f1a3da").unwrap();
        assert_eq!(kid.uuid(), "eb676abb-cb34-5e96-bbcf-616630f1a3da");
        assert_eq!(kid.as_bytes()[0], 0xeb);
    }
}
