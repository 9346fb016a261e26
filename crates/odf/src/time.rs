//! Simulation time stamps.
//!
//! Time stamps are non-negative, finite seconds with two sentinels:
//! [`Time::NotStarted`] orders before every real time and marks a receiver
//! that has not seen its first event, [`Time::Inactive`] orders after every
//! real time and marks a receiver that stopped permanently.

use core::cmp::Ordering;
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Wire encoding of [`Time::NotStarted`].
pub const NOT_STARTED_WIRE: f64 = -1.0;
/// Wire encoding of [`Time::Inactive`].
pub const INACTIVE_WIRE: f64 = -2.0;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub enum Time {
    NotStarted,
    At(f64),
    Inactive,
}

impl Time {
    pub const ZERO: Time = Time::At(0.0);

    /// Creates a real time stamp.
    ///
    /// # Panics
    ///
    /// Panics if `secs` is negative, NaN or infinite.
    pub fn new(secs: f64) -> Self {
        match Self::checked(secs) {
            Some(time) => time,
            None => panic!("time stamps must be finite and non-negative, got {secs}"),
        }
    }

    /// Creates a real time stamp, or `None` for negative or non-finite input.
    pub fn checked(secs: f64) -> Option<Self> {
        (secs.is_finite() && secs >= 0.0).then_some(Time::At(secs + 0.0))
    }

    /// Returns the seconds of a real time stamp.
    pub fn as_secs(self) -> Option<f64> {
        match self {
            Time::At(secs) => Some(secs),
            _ => None,
        }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        matches!(self, Time::At(_))
    }

    #[inline]
    pub fn is_inactive(self) -> bool {
        matches!(self, Time::Inactive)
    }

    #[inline]
    pub fn is_started(self) -> bool {
        !matches!(self, Time::NotStarted)
    }

    /// Adds a delay to a real time stamp; sentinels are returned unchanged.
    ///
    /// Fails with [`Error::InvalidTime`] if `delay` is negative or not finite,
    /// or if the sum is no longer finite.
    pub fn delayed(self, delay: f64) -> Result<Self, Error> {
        if !(delay.is_finite() && delay >= 0.0) {
            return Err(Error::InvalidTime(delay));
        }
        match self {
            Time::At(secs) => {
                let sum = secs + delay;
                Self::checked(sum).ok_or(Error::InvalidTime(sum))
            }
            other => Ok(other),
        }
    }

    /// Encodes the time stamp as a float, sentinels as negative values.
    pub fn to_wire(self) -> f64 {
        match self {
            Time::NotStarted => NOT_STARTED_WIRE,
            Time::At(secs) => secs,
            Time::Inactive => INACTIVE_WIRE,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Time::NotStarted => 0,
            Time::At(_) => 1,
            Time::Inactive => 2,
        }
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Time::At(a), Time::At(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl TryFrom<f64> for Time {
    type Error = Error;

    fn try_from(secs: f64) -> Result<Self, Self::Error> {
        Self::checked(secs).ok_or(Error::InvalidTime(secs))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Time::NotStarted => f.write_str("NOT_STARTED"),
            Time::At(secs) => write!(f, "{secs}"),
            Time::Inactive => f.write_str("INACTIVE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_bracket_real_times() {
        assert!(Time::NotStarted < Time::ZERO);
        assert!(Time::new(1e12) < Time::Inactive);
        assert!(Time::new(2.0) < Time::new(2.5));
        assert_eq!(Time::new(-0.0), Time::ZERO);
    }

    #[test]
    fn rejects_invalid_seconds() {
        assert_eq!(Time::try_from(-1.0), Err(Error::InvalidTime(-1.0)));
        assert!(Time::checked(f64::NAN).is_none());
        assert!(Time::checked(f64::INFINITY).is_none());
    }

    #[test]
    fn delay_leaves_sentinels_alone() {
        assert_eq!(Time::new(1.5).delayed(2.0), Ok(Time::new(3.5)));
        assert_eq!(Time::Inactive.delayed(2.0), Ok(Time::Inactive));
        assert_eq!(Time::NotStarted.delayed(2.0), Ok(Time::NotStarted));
    }

    #[test]
    fn delay_never_leaves_the_finite_range() {
        assert_eq!(Time::new(1.0).delayed(-0.5), Err(Error::InvalidTime(-0.5)));
        assert!(Time::new(1.0).delayed(f64::NAN).is_err());
        assert_eq!(
            Time::new(f64::MAX).delayed(f64::MAX),
            Err(Error::InvalidTime(f64::INFINITY))
        );
    }

    #[test]
    fn wire_encoding_uses_negative_sentinels() {
        assert_eq!(Time::NotStarted.to_wire(), NOT_STARTED_WIRE);
        assert_eq!(Time::Inactive.to_wire(), INACTIVE_WIRE);
        assert_eq!(Time::new(4.0).to_wire(), 4.0);
    }
}
