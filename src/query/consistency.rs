use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Consistency levels the database accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl Consistency {
    pub const ALL: [Consistency; 11] = [
        Consistency::Any,
        Consistency::One,
        Consistency::Two,
        Consistency::Three,
        Consistency::Quorum,
        Consistency::All,
        Consistency::LocalQuorum,
        Consistency::EachQuorum,
        Consistency::Serial,
        Consistency::LocalSerial,
        Consistency::LocalOne,
    ];

    /// Levels a read may request
    pub const READ: [Consistency; 10] = [
        Consistency::One,
        Consistency::Two,
        Consistency::Three,
        Consistency::Quorum,
        Consistency::All,
        Consistency::LocalQuorum,
        Consistency::EachQuorum,
        Consistency::Serial,
        Consistency::LocalSerial,
        Consistency::LocalOne,
    ];

    /// Levels a write may request
    pub const WRITE: [Consistency; 9] = [
        Consistency::Any,
        Consistency::One,
        Consistency::Two,
        Consistency::Three,
        Consistency::Quorum,
        Consistency::All,
        Consistency::LocalQuorum,
        Consistency::EachQuorum,
        Consistency::LocalOne,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::Any => "ANY",
            Consistency::One => "ONE",
            Consistency::Two => "TWO",
            Consistency::Three => "THREE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::EachQuorum => "EACH_QUORUM",
            Consistency::Serial => "SERIAL",
            Consistency::LocalSerial => "LOCAL_SERIAL",
            Consistency::LocalOne => "LOCAL_ONE",
        }
    }

    pub fn is_serial(&self) -> bool {
        matches!(self, Consistency::Serial | Consistency::LocalSerial)
    }

    pub fn is_valid_for_read(&self) -> bool {
        *self != Consistency::Any
    }

    pub fn is_valid_for_write(&self) -> bool {
        !self.is_serial()
    }
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Consistency::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("'{}' is not a consistency level", s))
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_consistency() {
        assert_eq!("LOCAL_ONE".parse::<Consistency>().unwrap(), Consistency::LocalOne);
        assert_eq!("local_quorum".parse::<Consistency>().unwrap(), Consistency::LocalQuorum);
        assert!("MOST".parse::<Consistency>().is_err());
    }

    #[test]
    fn test_serde_names_match_display() {
        for level in Consistency::ALL {
            let json = serde_json::to_string(&level).unwrap();
            assert_eq!(json, format!("\"{}\"", level));
        }
    }

    #[test]
    fn test_read_and_write_sets() {
        assert!(!Consistency::Any.is_valid_for_read());
        assert!(Consistency::LocalSerial.is_valid_for_read());
        assert!(!Consistency::Serial.is_valid_for_write());
        assert!(Consistency::READ.iter().all(|c| c.is_valid_for_read()));
        assert!(Consistency::WRITE.iter().all(|c| c.is_valid_for_write()));
    }
}
