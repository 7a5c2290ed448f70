use crate::errors::SetupError;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Range,
    str::FromStr,
};

/// A digest identifies the specific contents of a downloaded payload
///
/// Digests include the hash format, which is currently always `sha256`
#[derive(Clone)]
pub struct ContentDigest {
    serialized: String,
    format_pos: Range<usize>,
    hex_pos: Range<usize>,
}

impl Eq for ContentDigest {}

impl PartialEq for ContentDigest {
    fn eq(&self, other: &Self) -> bool {
        self.serialized.eq(&other.serialized)
    }
}

impl Hash for ContentDigest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serialized.hash(state);
    }
}

impl FromStr for ContentDigest {
    type Err = SetupError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentDigest::parse(s)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentDigest::parse(&s).map_err(de::Error::custom)
    }
}

impl ContentDigest {
    /// Returns a reference to the existing string representation of a
    /// [ContentDigest]
    ///
    /// This string always has a single colon. After the colon is 32 or more
    /// lowercase hexadecimal digits.
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Create a new ContentDigest from parts
    ///
    /// The format string and hex string are assembled and parsed.
    pub fn from_parts<T: fmt::LowerHex>(
        format_part: &str,
        hex_part: &T,
    ) -> Result<Self, SetupError> {
        ContentDigest::parse(&format!("{}:{:x}", format_part, hex_part))
    }

    /// Create a new ContentDigest by hashing content with `sha256`
    ///
    /// ```
    /// # use freeroot::ContentDigest;
    /// let digest = ContentDigest::from_content(b"cat");
    /// assert_eq!(digest.as_str(), "sha256:77af778b51abd4a3c51c5ddd97204a9c3ae614ebccb75a606c3b6865aed6744e");
    /// ```
    pub fn from_content(content_bytes: &[u8]) -> Self {
        ContentDigest::from_parts("sha256", &Sha256::digest(content_bytes))
            .expect("sha256 digests always parse")
    }

    /// Parse a [prim@str] as a [ContentDigest]
    ///
    /// ```
    /// # use freeroot::ContentDigest;
    /// let digest = ContentDigest::parse("sha256:00112233445566778899aabbccddeeff").unwrap();
    /// assert_eq!(digest.format_str(), "sha256");
    /// assert_eq!(digest.hex_str(), "00112233445566778899aabbccddeeff")
    /// ```
    pub fn parse(s: &str) -> Result<Self, SetupError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(concat!(
                "^",
                "(?P<dig_f>[a-zA-Z][a-zA-Z0-9]*(?:[-_+.][a-zA-Z][a-zA-Z0-9]*)*)",
                "[:]",
                "(?P<dig_h>[a-f0-9]{32,})",
                "$"
            ))
            .unwrap();
        }
        match RE.captures(s) {
            None => Err(SetupError::InvalidDigest(s.to_owned())),
            Some(captures) => match (captures.name("dig_f"), captures.name("dig_h")) {
                (Some(format), Some(hex)) => Ok(ContentDigest {
                    serialized: s.to_owned(),
                    format_pos: format.range(),
                    hex_pos: hex.range(),
                }),
                _ => Err(SetupError::InvalidDigest(s.to_owned())),
            },
        }
    }

    /// Return a reference to the format string portion of this digest.
    pub fn format_str(&self) -> &str {
        &self.serialized[self.format_pos.clone()]
    }

    /// Return a reference to the hexadecimal string portion of this digest.
    ///
    /// This is guaranteed to be a string of at least 32 hex digits.
    pub fn hex_str(&self) -> &str {
        &self.serialized[self.hex_pos.clone()]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_digests() {
        assert!(ContentDigest::parse("sha256:00112233445566778899aabbccddeeff").is_ok());
        assert!(ContentDigest::parse("sha256:00112233445566778899aabbccddeef").is_err());
        assert!(ContentDigest::parse("sha256:00112233445566778899AABBCCDDEEFF").is_err());
        assert!(ContentDigest::parse("00112233445566778899aabbccddeeff").is_err());
        assert!(ContentDigest::parse(":00112233445566778899aabbccddeeff").is_err());
        assert!(ContentDigest::parse("sha256:").is_err());
        assert!(ContentDigest::parse("").is_err());
        assert!(ContentDigest::parse("bla-a1.a2:00112233445566778899aabbccddeeff").is_ok());
    }

    #[test]
    fn digest_of_empty_content() {
        let digest = ContentDigest::from_content(b"");
        assert_eq!(digest.format_str(), "sha256");
        assert_eq!(
            digest.hex_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn json_round_trip() {
        let digest = ContentDigest::from_content(b"cat");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(
            json,
            "\"sha256:77af778b51abd4a3c51c5ddd97204a9c3ae614ebccb75a606c3b6865aed6744e\""
        );
        let parsed: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, digest);
        assert!(serde_json::from_str::<ContentDigest>("\"nope\"").is_err());
    }
}
