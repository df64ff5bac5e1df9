//! Requested certificate validity.
//!
//! The certificate authority only issues origin certificates for a small
//! fixed set of lifetimes. Anything else is rejected here, at construction
//! time, so an invalid TTL never reaches the network.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ConfigError;

/// Requested certificate lifetime in days
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Validity {
    /// 7 days
    Week,
    /// 30 days
    #[default]
    Month,
    /// 90 days
    Quarter,
}

impl Validity {
    /// All accepted values, shortest first
    pub const ALL: [Validity; 3] = [Validity::Week, Validity::Month, Validity::Quarter];

    /// Lifetime in days as sent to the authority
    pub const fn days(self) -> u32 {
        match self {
            Validity::Week => 7,
            Validity::Month => 30,
            Validity::Quarter => 90,
        }
    }
}

impl TryFrom<u32> for Validity {
    type Error = ConfigError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        match days {
            7 => Ok(Validity::Week),
            30 => Ok(Validity::Month),
            90 => Ok(Validity::Quarter),
            other => Err(ConfigError::InvalidValidity(other)),
        }
    }
}

impl From<Validity> for u32 {
    fn from(validity: Validity) -> Self {
        validity.days()
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} days", self.days())
    }
}
