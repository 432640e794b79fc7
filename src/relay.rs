// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay entity descriptors.
//!
//! Plain relays carry no logic beyond formatting a power command and
//! comparing a state literal, so the runtime wrapper is the host's
//! business; this module only derives the descriptor the host needs.
//! A relay appears under the switch platform by default and under the
//! light platform when `SetOption30` forces it or the first iFan slot
//! takes it.

use crate::availability::AvailabilityConfig;
use crate::device::DeviceDescriptor;
use crate::entity::{EntityCommon, EntityIndex, Platform};
use crate::topics;

/// Immutable configuration of one relay entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasmotaRelayConfig {
    /// Fields shared by all entities.
    pub common: EntityCommon,
    /// Availability wiring.
    pub availability: AvailabilityConfig,
    /// Relay slot backing this entity.
    pub idx: usize,
    /// Command topic root.
    pub command_topic: String,
    /// Command result topic.
    pub result_topic: String,
    /// Configured "off" literal.
    pub state_power_off: String,
    /// Configured "on" literal.
    pub state_power_on: String,
    /// Periodic state telemetry topic.
    pub state_topic: String,
}

impl TasmotaRelayConfig {
    /// Derives the config for the relay at slot `idx` on `platform`.
    #[must_use]
    pub fn from_discovery(device: &DeviceDescriptor, idx: usize, platform: Platform) -> Self {
        Self {
            common: EntityCommon {
                endpoint: "relay",
                index: EntityIndex::Index(idx),
                friendly_name: Some(topics::friendly_name(device, idx)),
                mac: device.mac.clone(),
                platform,
                poll_topic: topics::command_state_topic(device),
                poll_payload: String::new(),
            },
            availability: AvailabilityConfig::from_device(device),
            idx,
            command_topic: topics::command_topic(device),
            result_topic: topics::stat_result_topic(device),
            state_power_off: topics::state_power_off(device),
            state_power_on: topics::state_power_on(device),
            state_topic: topics::tele_state_topic(device),
        }
    }

    /// Returns the full power command topic for this relay.
    #[must_use]
    pub fn power_command_topic(&self) -> String {
        format!("{}Power{}", self.command_topic, self.idx + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_fixtures::PLUG_DISCOVERY;

    #[test]
    fn relay_config_from_discovery() {
        let device: DeviceDescriptor = serde_json::from_str(PLUG_DISCOVERY).unwrap();
        let cfg = TasmotaRelayConfig::from_discovery(&device, 0, Platform::Switch);
        assert_eq!(cfg.common.unique_id(), "00000049A3BC_switch_relay_0");
        assert_eq!(cfg.power_command_topic(), "cmnd/tasmota_49A3BC/Power1");
        assert_eq!(cfg.state_power_on, "ON");
        assert_eq!(cfg.availability.topic, "tele/tasmota_49A3BC/LWT");
    }

    #[test]
    fn relay_as_light_keeps_endpoint() {
        let device: DeviceDescriptor = serde_json::from_str(PLUG_DISCOVERY).unwrap();
        let cfg = TasmotaRelayConfig::from_discovery(&device, 1, Platform::Light);
        assert_eq!(cfg.common.unique_id(), "00000049A3BC_light_relay_1");
    }
}
