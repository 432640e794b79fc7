// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fade speed type for light transitions.
//!
//! Tasmota exposes a single global fade-rate scalar through the `Speed`
//! command, expressed as half-seconds per full 0-100% change. The
//! transition calculator in [`crate::light`] produces values of this type.

use std::fmt;

use crate::error::ValueError;

/// Fade speed for light transitions (1-40).
///
/// Lower values mean faster transitions, higher values mean slower
/// transitions: 1 is nearly instant, 40 takes 20 seconds for a full sweep.
///
/// # Examples
///
/// ```
/// use tasmota_bridge::types::FadeSpeed;
///
/// let speed = FadeSpeed::new(8).unwrap();
/// assert_eq!(speed.value(), 8);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FadeSpeed(u8);

impl FadeSpeed {
    /// Minimum speed value (fastest transition).
    pub const MIN: u8 = 1;

    /// Maximum speed value (slowest transition).
    pub const MAX: u8 = 40;

    /// Creates a new fade speed value.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside [1, 40].
    pub fn new(value: u8) -> Result<Self, ValueError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ValueError::OutOfRange {
                min: u16::from(Self::MIN),
                max: u16::from(Self::MAX),
                actual: u16::from(value),
            });
        }
        Ok(Self(value))
    }

    /// Creates a fade speed, clamping to the valid range.
    #[must_use]
    pub const fn clamped(value: u8) -> Self {
        if value < Self::MIN {
            Self(Self::MIN)
        } else if value > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(value)
        }
    }

    /// Returns the speed value.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Returns the duration in seconds of a full 0-100% sweep at this speed.
    #[must_use]
    pub fn full_sweep_seconds(&self) -> f32 {
        f32::from(self.0) / 2.0
    }
}

impl fmt::Display for FadeSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for FadeSpeed {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_speed_valid() {
        for v in 1..=40 {
            let speed = FadeSpeed::new(v).unwrap();
            assert_eq!(speed.value(), v);
        }
    }

    #[test]
    fn fade_speed_invalid() {
        assert!(FadeSpeed::new(0).is_err());
        assert!(FadeSpeed::new(41).is_err());
    }

    #[test]
    fn fade_speed_clamped() {
        assert_eq!(FadeSpeed::clamped(0).value(), 1);
        assert_eq!(FadeSpeed::clamped(50).value(), 40);
        assert_eq!(FadeSpeed::clamped(25).value(), 25);
    }

    #[test]
    fn fade_speed_sweep_duration() {
        assert!((FadeSpeed::new(8).unwrap().full_sweep_seconds() - 4.0).abs() < f32::EPSILON);
    }
}
