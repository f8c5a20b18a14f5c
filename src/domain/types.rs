use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric affiliate identifier. `0` is reserved for "no affiliate".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AffiliateId(pub i64);

impl AffiliateId {
    /// Sentinel stored on hits that are not credited to anyone
    pub const NONE: Self = Self(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AffiliateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AffiliateId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HitId(pub i64);

impl HitId {
    /// Hit ids are assigned from 1 upwards; anything else never matches a row
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for HitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferralId(pub i64);

impl fmt::Display for ReferralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel a hit arrived through. Stored as a lower-case key in the `type` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(into = "String", from = "String")]
pub enum Medium {
    #[default]
    Link,
    Coupon,
    Other(String),
}

impl Medium {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Link => "link",
            Self::Coupon => "coupon",
            Self::Other(key) => key,
        }
    }

    /// Parses a stored type, sanitizing it to a key first
    pub fn from_str(s: &str) -> Self {
        match sanitize_key(s).as_str() {
            "link" => Self::Link,
            "coupon" => Self::Coupon,
            key => Self::Other(key.to_string()),
        }
    }

    /// Display label; unknown mediums are shown as their key
    pub fn label(&self) -> &str {
        match self {
            Self::Link => "Link",
            Self::Coupon => "Coupon",
            Self::Other(key) => key,
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for Medium {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}

impl From<Medium> for String {
    fn from(medium: Medium) -> Self {
        medium.as_str().to_string()
    }
}

/// Lower-cases and keeps only `[a-z0-9_-]`
pub fn sanitize_key(s: &str) -> String {
    s.chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Paid,
    #[default]
    Unpaid,
    Rejected,
    Draft,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Unpaid => "unpaid",
            Self::Rejected => "rejected",
            Self::Draft => "draft",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "paid" => Some(Self::Paid),
            "unpaid" => Some(Self::Unpaid),
            "rejected" => Some(Self::Rejected),
            "draft" => Some(Self::Draft),
            _ => None,
        }
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paid => write!(f, "Paid"),
            Self::Unpaid => write!(f, "Unpaid"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Draft => write!(f, "Draft"),
        }
    }
}
