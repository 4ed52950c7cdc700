#![forbid(unsafe_code)]

//! Flags handed to a regular-expression engine by string operators.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlagsError {
    #[error("unknown regex flag bits {bits:#x}")]
    UnknownBits { bits: u32 },
    #[error("unknown regex flag name '{0}'")]
    UnknownName(String),
}

/// Bit set of matching options. Values are combined with `|`.
///
/// The numeric values are stable and may be persisted; unassigned bits
/// between them are reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RegexFlags(u32);

const NAMED: [(&str, RegexFlags); 2] = [
    ("MULTILINE", RegexFlags::MULTILINE),
    ("DOTALL", RegexFlags::DOTALL),
];

impl RegexFlags {
    pub const DEFAULT: Self = Self(0);
    /// `^` and `$` also match at line boundaries inside the input.
    pub const MULTILINE: Self = Self(8);
    /// `.` also matches line terminators.
    pub const DOTALL: Self = Self(16);

    const KNOWN: u32 = Self::MULTILINE.0 | Self::DOTALL.0;

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Flags from their numeric value, rejecting reserved bits.
    pub fn from_bits(bits: u32) -> Result<Self, FlagsError> {
        if bits & !Self::KNOWN != 0 {
            return Err(FlagsError::UnknownBits {
                bits: bits & !Self::KNOWN,
            });
        }
        Ok(Self(bits))
    }

    /// Flags from their numeric value, keeping reserved bits as-is.
    #[must_use]
    pub const fn from_bits_retain(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// True when `^`/`$` should match at internal line boundaries.
#[must_use]
pub const fn is_multiline(flags: RegexFlags) -> bool {
    flags.contains(RegexFlags::MULTILINE)
}

/// True when `.` should match line terminators.
#[must_use]
pub const fn is_dotall(flags: RegexFlags) -> bool {
    flags.contains(RegexFlags::DOTALL)
}

impl BitOr for RegexFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for RegexFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RegexFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl TryFrom<u32> for RegexFlags {
    type Error = FlagsError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<RegexFlags> for u32 {
    fn from(flags: RegexFlags) -> Self {
        flags.0
    }
}

impl fmt::Display for RegexFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("DEFAULT");
        }
        let mut first = true;
        for (name, flag) in NAMED {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        let reserved = self.0 & !Self::KNOWN;
        if reserved != 0 {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "{reserved:#x}")?;
        }
        Ok(())
    }
}

impl FromStr for RegexFlags {
    type Err = FlagsError;

    /// Parses `DEFAULT` or `|`-separated flag names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Self::DEFAULT;
        for part in s.split('|').map(str::trim) {
            if part.eq_ignore_ascii_case("DEFAULT") {
                continue;
            }
            let (_, flag) = NAMED
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(part))
                .ok_or_else(|| FlagsError::UnknownName(part.to_owned()))?;
            flags |= *flag;
        }
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::{FlagsError, RegexFlags, is_dotall, is_multiline};

    #[test]
    fn predicates_read_their_own_bit() {
        assert!(!is_multiline(RegexFlags::DEFAULT));
        assert!(is_multiline(RegexFlags::MULTILINE));
        assert!(is_multiline(RegexFlags::MULTILINE | RegexFlags::DOTALL));
        assert!(!is_dotall(RegexFlags::MULTILINE));
        assert!(is_dotall(RegexFlags::DOTALL));
        assert!(!is_dotall(RegexFlags::DEFAULT));
    }

    #[test]
    fn numeric_values_are_stable() {
        assert_eq!(RegexFlags::DEFAULT.bits(), 0);
        assert_eq!(RegexFlags::MULTILINE.bits(), 8);
        assert_eq!(RegexFlags::DOTALL.bits(), 16);
        assert_eq!((RegexFlags::MULTILINE | RegexFlags::DOTALL).bits(), 24);
    }

    #[test]
    fn predicates_ignore_reserved_bits() {
        let flags = RegexFlags::from_bits_retain(0b1_0001);
        assert!(is_dotall(flags));
        assert!(!is_multiline(flags));
        assert_eq!(flags.to_string(), "DOTALL|0x1");
    }

    #[test]
    fn from_bits_rejects_reserved_bits() {
        assert_eq!(RegexFlags::from_bits(24), Ok(RegexFlags::MULTILINE | RegexFlags::DOTALL));
        assert_eq!(
            RegexFlags::from_bits(8 | 4),
            Err(FlagsError::UnknownBits { bits: 4 })
        );
    }

    #[test]
    fn or_assign_and_mask() {
        let mut flags = RegexFlags::DEFAULT;
        assert!(flags.is_empty());
        flags |= RegexFlags::DOTALL;
        flags |= RegexFlags::DOTALL;
        assert_eq!(flags, RegexFlags::DOTALL);
        assert_eq!(flags & RegexFlags::MULTILINE, RegexFlags::DEFAULT);
        assert!((flags | RegexFlags::MULTILINE).contains(flags));
    }

    #[test]
    fn display_and_parse() {
        assert_eq!(RegexFlags::DEFAULT.to_string(), "DEFAULT");
        assert_eq!(
            (RegexFlags::DOTALL | RegexFlags::MULTILINE).to_string(),
            "MULTILINE|DOTALL"
        );
        assert_eq!(
            "dotall | MULTILINE".parse::<RegexFlags>(),
            Ok(RegexFlags::MULTILINE | RegexFlags::DOTALL)
        );
        assert_eq!("DEFAULT".parse::<RegexFlags>(), Ok(RegexFlags::DEFAULT));
        assert_eq!(
            "IGNORECASE".parse::<RegexFlags>(),
            Err(FlagsError::UnknownName("IGNORECASE".to_owned()))
        );
    }

    #[test]
    fn serde_uses_the_number() {
        let flags = RegexFlags::MULTILINE | RegexFlags::DOTALL;
        assert_eq!(serde_json::to_string(&flags).expect("serialize"), "24");
        let back: RegexFlags = serde_json::from_str("8").expect("deserialize");
        assert_eq!(back, RegexFlags::MULTILINE);
        assert!(serde_json::from_str::<RegexFlags>("1").is_err());
    }
}
