// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Brightness level type for dimmable lights.

use std::fmt;

use crate::error::ValueError;

/// Brightness level as a percentage (0-100).
///
/// Tasmota reports and accepts brightness through the `Dimmer` and
/// `Channel<n>` commands as an integer percentage.
///
/// # Examples
///
/// ```
/// use tasmota_bridge::types::Dimmer;
///
/// let dimmer = Dimmer::new(75).unwrap();
/// assert_eq!(dimmer.value(), 75);
/// assert_eq!(dimmer.fraction(), 0.75);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Dimmer(u8);

impl Dimmer {
    /// Minimum brightness (off).
    pub const MIN: u8 = 0;

    /// Maximum brightness.
    pub const MAX: u8 = 100;

    /// Fully off.
    pub const OFF: Self = Self(0);

    /// Fully on.
    pub const FULL: Self = Self(100);

    /// Creates a new brightness value.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidBrightness` if value is greater than 100.
    pub fn new(value: u8) -> Result<Self, ValueError> {
        if value > Self::MAX {
            return Err(ValueError::InvalidBrightness(value));
        }
        Ok(Self(value))
    }

    /// Creates a brightness value, clamping to the valid range.
    #[must_use]
    pub const fn clamped(value: u8) -> Self {
        if value > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(value)
        }
    }

    /// Returns the brightness percentage.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Returns the brightness as a fraction in 0.0..=1.0.
    #[must_use]
    pub fn fraction(&self) -> f32 {
        f32::from(self.0) / 100.0
    }

    /// Returns whether the brightness is zero.
    #[must_use]
    pub const fn is_off(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Dimmer {
    fn default() -> Self {
        Self::FULL
    }
}

impl fmt::Display for Dimmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<u8> for Dimmer {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
