// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the entity model.
//!
//! Each type ensures values are within their valid ranges at construction
//! time, preventing invalid values from reaching the wire.
//!
//! # Types
//!
//! - [`Dimmer`] - Brightness level (0-100%)
//! - [`ColorTemp`] - Color temperature in mireds (153-500)
//! - [`MiredRange`] - Device-supported color temperature span
//! - [`HsbColor`] - HSB color (Hue 0-360, Saturation 0-100, Brightness 0-100)
//! - [`FadeSpeed`] - Light transition speed (1-40, half-seconds per full change)

mod color;
mod dimmer;
mod speed;

pub use color::{ColorTemp, HsbColor, MiredRange, hue_saturation_to_rgb};
pub use dimmer::Dimmer;
pub use speed::FadeSpeed;
