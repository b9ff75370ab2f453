//! Linear vesting curve.
//!
//! Maps a timestamp to the fraction of a grant that is claimable. All
//! fractions are WAD-scaled integers so results are reproducible bit for
//! bit; nothing here touches floating point.

use serde::{Deserialize, Serialize};

use super::fixed::{WAD, mul_div};
use crate::error::ValidationError;

/// Vesting window `[start_time, maturation_time]`, in seconds.
///
/// `start_time < maturation_time` holds for every value of this type,
/// including deserialized ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleRepr")]
pub struct VestingSchedule {
    start_time: u64,
    maturation_time: u64,
}

#[derive(Deserialize)]
struct ScheduleRepr {
    start_time: u64,
    maturation_time: u64,
}

impl TryFrom<ScheduleRepr> for VestingSchedule {
    type Error = ValidationError;

    fn try_from(repr: ScheduleRepr) -> Result<Self, Self::Error> {
        Self::new(repr.start_time, repr.maturation_time)
    }
}

impl VestingSchedule {
    pub fn new(start_time: u64, maturation_time: u64) -> Result<Self, ValidationError> {
        if start_time >= maturation_time {
            return Err(ValidationError::InvalidSchedule {
                start: start_time,
                maturation: maturation_time,
            });
        }
        Ok(Self {
            start_time,
            maturation_time,
        })
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn maturation_time(&self) -> u64 {
        self.maturation_time
    }

    pub fn duration(&self) -> u64 {
        self.maturation_time - self.start_time
    }

    /// Seconds vested at `now`, clamped to `[0, duration]`.
    pub fn elapsed(&self, now: u64) -> u64 {
        now.clamp(self.start_time, self.maturation_time) - self.start_time
    }

    /// Zero penalty left.
    pub fn is_mature(&self, now: u64) -> bool {
        now >= self.maturation_time
    }

    /// Claimable fraction at `now` in WAD, rounded down.
    pub fn claimable_fraction(&self, now: u64) -> u128 {
        // elapsed <= duration bounds the quotient by WAD
        mul_div(WAD, u128::from(self.elapsed(now)), u128::from(self.duration())).unwrap_or(WAD)
    }

    /// `WAD - claimable_fraction(now)`.
    pub fn penalty_fraction(&self, now: u64) -> u128 {
        WAD - self.claimable_fraction(now)
    }

    /// Portion of `total` released at `now`.
    ///
    /// Computed as `floor(total * elapsed / duration)` in one step rather
    /// than through the rounded fraction.
    pub fn vested_amount(&self, total: u128, now: u64) -> u128 {
        mul_div(total, u128::from(self.elapsed(now)), u128::from(self.duration())).unwrap_or(total)
    }
}

/// Claimable fraction for a raw `(start, maturation)` window.
pub fn claimable_fraction(now: u64, start: u64, maturation: u64) -> Result<u128, ValidationError> {
    Ok(VestingSchedule::new(start, maturation)?.claimable_fraction(now))
}

/// Penalty fraction for a raw `(start, maturation)` window.
pub fn penalty_fraction(now: u64, start: u64, maturation: u64) -> Result<u128, ValidationError> {
    Ok(VestingSchedule::new(start, maturation)?.penalty_fraction(now))
}
