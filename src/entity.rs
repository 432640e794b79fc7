// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common building blocks of entity descriptors.
//!
//! Every capability instance a device exposes is described by an immutable
//! config value. The pieces shared by all of them live here: the platform
//! taxonomy, the discovery hash correlating an instance across
//! reconfiguration, and the common config fields.

use std::fmt;

/// The automation-host platform an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Binary sensor backed by a Tasmota switch input.
    BinarySensor,
    /// Cover backed by a Tasmota shutter.
    Cover,
    /// Fan backed by an iFan controller.
    Fan,
    /// Light backed by a light channel or a relay forced to light.
    Light,
    /// Numeric or textual sensor.
    Sensor,
    /// Fixed per-device status sensor.
    StatusSensor,
    /// Switch backed by a plain relay.
    Switch,
}

impl Platform {
    /// Returns the platform's canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BinarySensor => "binary_sensor",
            Self::Cover => "cover",
            Self::Fan => "fan",
            Self::Light => "light",
            Self::Sensor => "sensor",
            Self::StatusSensor => "status_sensor",
            Self::Switch => "switch",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one capability instance within a device.
///
/// Indexed capabilities (relays, lights, shutters) use their slot index;
/// singleton and path-derived capabilities use a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityIndex {
    /// Capability without a per-slot index.
    None,
    /// Slot index of an indexed capability.
    Index(usize),
    /// Name of a singleton or path-derived capability.
    Named(String),
}

impl fmt::Display for EntityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Index(idx) => write!(f, "{idx}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Stable identity tuple correlating an entity across reconfiguration.
///
/// Two discovery passes over identical payloads produce identical hashes;
/// the host diffs hash sets to decide update-versus-replace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryHash {
    /// Device MAC.
    pub mac: String,
    /// Host platform.
    pub platform: Platform,
    /// Capability kind within the platform (e.g. a light backed by a relay).
    pub kind: &'static str,
    /// Instance identity within the kind.
    pub id: EntityIndex,
}

impl DiscoveryHash {
    /// Returns the flattened unique id of this hash.
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("{}_{}_{}_{}", self.mac, self.platform, self.kind, self.id)
    }
}

impl fmt::Display for DiscoveryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.mac, self.platform, self.kind, self.id)
    }
}

/// Config fields shared by every entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCommon {
    /// Capability endpoint name.
    pub endpoint: &'static str,
    /// Instance identity.
    pub index: EntityIndex,
    /// Display name, if the device provides one.
    pub friendly_name: Option<String>,
    /// Device MAC.
    pub mac: String,
    /// Host platform.
    pub platform: Platform,
    /// Topic published to request a state refresh.
    pub poll_topic: String,
    /// Payload published to request a state refresh.
    pub poll_payload: String,
}

impl EntityCommon {
    /// Returns the entity's unique id.
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("{}_{}_{}_{}", self.mac, self.platform, self.endpoint, self.index)
    }
}
