use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Milliseconds between the Unix epoch and the first second of 2015, the
/// reference point for the timestamp packed into every snowflake.
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// A 64-bit entity identifier.
///
/// On the wire it is always an ASCII decimal string, because the value range
/// exceeds what many JSON parsers represent exactly. Deserialization also
/// accepts a JSON integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Snowflake(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier {input:?}: {reason}")]
pub struct InvalidSnowflake {
    pub input: String,
    pub reason: &'static str,
}

impl Snowflake {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parse the decimal form. Leading zeros are tolerated.
    pub fn parse(input: &str) -> Result<Self, InvalidSnowflake> {
        let invalid = |reason| InvalidSnowflake {
            input: input.to_string(),
            reason,
        };
        if input.is_empty() {
            return Err(invalid("empty"));
        }
        if !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }
        input
            .parse::<u64>()
            .map(Self)
            .map_err(|_| invalid("out of range for 64-bit unsigned"))
    }

    /// Creation time encoded in the upper 42 bits.
    pub fn created_at(self) -> Option<DateTime<Utc>> {
        let ms = (self.0 >> 22).checked_add(DISCORD_EPOCH_MS)?;
        DateTime::<Utc>::from_timestamp_millis(i64::try_from(ms).ok()?)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl FromStr for Snowflake {
    type Err = InvalidSnowflake;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snowflake({})", self.0)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalU64Visitor).map(Self)
    }
}

/// Accepts a decimal string or a non-negative integer. Shared with other
/// string-encoded u64 fields such as permission bitsets.
pub(crate) struct DecimalU64Visitor;

impl Visitor<'_> for DecimalU64Visitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or unsigned integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        Snowflake::parse(v).map(Snowflake::get).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_roundtrip() {
        for v in [0u64, 1, 41771983423143937, u64::MAX] {
            let id = Snowflake::new(v);
            assert_eq!(Snowflake::parse(&id.to_string()).unwrap(), id);
        }
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(Snowflake::parse("").unwrap_err().reason, "empty");
        assert!(Snowflake::parse("12a").is_err());
        assert!(Snowflake::parse("-1").is_err());
        assert!(Snowflake::parse("+1").is_err());
        assert!(Snowflake::parse(" 1").is_err());
        // u64::MAX + 1
        assert!(Snowflake::parse("18446744073709551616").is_err());
    }

    #[test]
    fn leading_zeros_compare_by_value() {
        assert_eq!(Snowflake::parse("00042").unwrap(), Snowflake::new(42));
        assert_eq!(Snowflake::parse("00042").unwrap().to_string(), "42");
    }

    #[test]
    fn serializes_as_string_and_accepts_numbers() {
        let id = Snowflake::new(175928847299117063);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"175928847299117063\"");
        let from_str: Snowflake = serde_json::from_str("\"175928847299117063\"").unwrap();
        let from_num: Snowflake = serde_json::from_str("175928847299117063").unwrap();
        assert_eq!(from_str, id);
        assert_eq!(from_num, id);
        assert!(serde_json::from_str::<Snowflake>("\"x\"").is_err());
        assert!(serde_json::from_str::<Snowflake>("-5").is_err());
    }

    #[test]
    fn created_at_uses_discord_epoch() {
        let id = Snowflake::new(175928847299117063);
        let ts = id.created_at().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_462_015_105_796);
    }
}
