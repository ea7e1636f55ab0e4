//! Tooth numbering and surface primitives
//!
//! Teeth are addressed in FDI two-digit notation: the first digit is the
//! quadrant (1-4, permanent dentition), the second the position from the
//! midline (1-8).

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated FDI tooth number in the range 11-48
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ToothNumber(u8);

impl ToothNumber {
    /// Validate a raw tooth number
    pub fn new(raw: u8) -> Result<Self> {
        let quadrant = raw / 10;
        let position = raw % 10;

        if (1..=4).contains(&quadrant) && (1..=8).contains(&position) {
            Ok(Self(raw))
        } else {
            Err(AppError::InvalidFormat {
                message: format!("tooth number {} is not a permanent FDI tooth (11-48)", raw),
            })
        }
    }

    /// Validate a tooth number coming from a wider integer column
    pub fn from_i32(raw: i32) -> Result<Self> {
        u8::try_from(raw)
            .map_err(|_| AppError::InvalidFormat {
                message: format!("tooth number {} is out of range", raw),
            })
            .and_then(Self::new)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Position counted from the midline (1 = central incisor, 8 = third molar)
    pub fn position(self) -> u8 {
        self.0 % 10
    }

    /// Tooth type implied by the FDI position
    pub fn default_type(self) -> ToothType {
        match self.position() {
            1..=3 => ToothType::Anterior,
            4 | 5 => ToothType::Premolar,
            _ => ToothType::Molar,
        }
    }
}

impl TryFrom<u8> for ToothNumber {
    type Error = AppError;

    fn try_from(raw: u8) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<ToothNumber> for u8 {
    fn from(tooth: ToothNumber) -> Self {
        tooth.0
    }
}

impl From<ToothNumber> for i32 {
    fn from(tooth: ToothNumber) -> Self {
        tooth.0 as i32
    }
}

impl fmt::Display for ToothNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tooth surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Mesial,
    Distal,
    Occlusal,
    Buccal,
    Lingual,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Mesial => "mesial",
            Surface::Distal => "distal",
            Surface::Occlusal => "occlusal",
            Surface::Buccal => "buccal",
            Surface::Lingual => "lingual",
        }
    }
}

impl FromStr for Surface {
    type Err = AppError;

    /// Accepts full names and the single-letter chart abbreviations (M, D, O, B, L)
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mesial" | "m" => Ok(Surface::Mesial),
            "distal" | "d" => Ok(Surface::Distal),
            "occlusal" | "incisal" | "o" | "i" => Ok(Surface::Occlusal),
            "buccal" | "labial" | "b" => Ok(Surface::Buccal),
            "lingual" | "palatal" | "l" | "p" => Ok(Surface::Lingual),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown tooth surface '{}'", other),
            }),
        }
    }
}

/// Upper or lower jaw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jaw {
    Upper,
    Lower,
}

impl Jaw {
    pub fn as_str(&self) -> &'static str {
        match self {
            Jaw::Upper => "upper",
            Jaw::Lower => "lower",
        }
    }
}

impl FromStr for Jaw {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upper" => Ok(Jaw::Upper),
            "lower" => Ok(Jaw::Lower),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown jaw '{}'", other),
            }),
        }
    }
}

/// Coarse tooth classification used by the chart renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToothType {
    Anterior,
    Premolar,
    Molar,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tooth_numbers() {
        assert!(ToothNumber::new(11).is_ok());
        assert!(ToothNumber::new(48).is_ok());
        assert!(ToothNumber::new(28).is_ok());
        let valid = (0..=u8::MAX).filter(|raw| ToothNumber::new(*raw).is_ok()).count();
        assert_eq!(valid, 32);
    }

    #[test]
    fn test_invalid_tooth_numbers() {
        for raw in [0, 10, 19, 49, 51, 85, 99] {
            assert!(ToothNumber::new(raw).is_err(), "{} should be rejected", raw);
        }
        assert!(ToothNumber::from_i32(-1).is_err());
        assert!(ToothNumber::from_i32(300).is_err());
    }

    #[test]
    fn test_tooth_classification() {
        let central = ToothNumber::new(21).unwrap();
        assert_eq!(central.default_type(), ToothType::Anterior);

        let premolar = ToothNumber::new(34).unwrap();
        assert_eq!(premolar.default_type(), ToothType::Premolar);

        assert_eq!(ToothNumber::new(46).unwrap().default_type(), ToothType::Molar);
    }

    #[test]
    fn test_tooth_number_serde() {
        let tooth: ToothNumber = serde_json::from_str("16").unwrap();
        assert_eq!(tooth.get(), 16);
        assert_eq!(serde_json::to_string(&tooth).unwrap(), "16");
        assert!(serde_json::from_str::<ToothNumber>("60").is_err());
    }

    #[test]
    fn test_surface_parsing() {
        assert_eq!("M".parse::<Surface>().unwrap(), Surface::Mesial);
        assert_eq!("palatal".parse::<Surface>().unwrap(), Surface::Lingual);
        assert_eq!(" Occlusal ".parse::<Surface>().unwrap(), Surface::Occlusal);
        assert!("cervical".parse::<Surface>().is_err());
    }
}
