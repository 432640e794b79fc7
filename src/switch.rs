// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Switch input descriptors.
//!
//! A switch input's mode decides two things: whether it surfaces as a
//! binary sensor at all, and which press events it emits as automation
//! triggers. PIR-style modes (`PUSHON`) additionally auto-reset after one
//! second and are not pollable.

use crate::availability::AvailabilityConfig;
use crate::device::DeviceDescriptor;
use crate::entity::{EntityCommon, EntityIndex, Platform};
use crate::topics;
use crate::trigger::{
    TRIGGER_DOUBLE_PRESS, TRIGGER_LONG_PRESS, TRIGGER_NONE, TRIGGER_SHORT_PRESS,
    TasmotaTriggerConfig, TriggerSource,
};

/// Behavior profile of one switch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchModeProfile {
    /// The input surfaces as a binary sensor.
    pub binary_sensor: bool,
    /// Seconds after which the reported state auto-resets to off.
    pub off_delay: Option<u32>,
    /// Trigger type of the TOGGLE event.
    pub toggle_trigger: &'static str,
    /// Trigger type of the HOLD event.
    pub hold_trigger: &'static str,
}

/// Returns the profile of a `SwitchMode` value.
///
/// Unknown and unused (`-1`) modes profile as inert.
#[must_use]
pub fn switch_mode_profile(mode: i8) -> SwitchModeProfile {
    let (binary_sensor, off_delay, toggle_trigger, hold_trigger) = match mode {
        // TOGGLE
        0 => (false, None, TRIGGER_SHORT_PRESS, TRIGGER_NONE),
        // FOLLOW / FOLLOW_INV
        1 | 2 => (true, None, TRIGGER_NONE, TRIGGER_NONE),
        // PUSHBUTTON / PUSHBUTTON_INV
        3 | 4 => (true, None, TRIGGER_SHORT_PRESS, TRIGGER_NONE),
        // PUSHBUTTONHOLD / PUSHBUTTONHOLD_INV
        5 | 6 => (true, None, TRIGGER_SHORT_PRESS, TRIGGER_LONG_PRESS),
        // PUSHBUTTON_TOGGLE
        7 => (false, None, TRIGGER_SHORT_PRESS, TRIGGER_NONE),
        // TOGGLEMULTI
        8 => (false, None, TRIGGER_SHORT_PRESS, TRIGGER_DOUBLE_PRESS),
        // FOLLOWMULTI / FOLLOWMULTI_INV
        9 | 10 => (true, None, TRIGGER_NONE, TRIGGER_DOUBLE_PRESS),
        // PUSHHOLDMULTI / PUSHHOLDMULTI_INV
        11 | 12 => (false, None, TRIGGER_SHORT_PRESS, TRIGGER_NONE),
        // PUSHON / PUSHON_INV: PIR, auto-off after one second
        13 | 14 => (true, Some(1), TRIGGER_NONE, TRIGGER_NONE),
        // PUSH_IGNORE / PUSH_IGNORE_INV
        15 | 16 => (true, None, TRIGGER_NONE, TRIGGER_NONE),
        _ => (false, None, TRIGGER_NONE, TRIGGER_NONE),
    };
    SwitchModeProfile {
        binary_sensor,
        off_delay,
        toggle_trigger,
        hold_trigger,
    }
}

/// Switch modes whose state cannot be polled.
fn is_no_poll_mode(mode: i8) -> bool {
    matches!(mode, 13 | 14)
}

/// Immutable configuration of one binary-sensor switch input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasmotaSwitchConfig {
    /// Fields shared by all entities.
    pub common: EntityCommon,
    /// Availability wiring.
    pub availability: AvailabilityConfig,
    /// Seconds after which the reported state auto-resets to off.
    pub off_delay: Option<u32>,
    /// Configured "off" literal.
    pub state_power_off: String,
    /// Configured "on" literal.
    pub state_power_on: String,
    /// Command result topic, carrying `{"<name>": {"Action": ...}}`.
    pub result_topic: String,
    /// Periodic sensor telemetry topic; absent for no-poll modes.
    pub sensor_topic: Option<String>,
    /// Polled `STATUS10` response topic; absent for no-poll modes.
    pub status_topic: Option<String>,
    /// JSON key the input is reported under.
    pub switch_name: String,
}

impl TasmotaSwitchConfig {
    /// Derives the config for switch slot `idx`.
    ///
    /// Returns `None` when the mode does not surface as a binary sensor.
    #[must_use]
    pub fn from_discovery(device: &DeviceDescriptor, idx: usize) -> Option<Self> {
        let mode = device.switch_modes.get(idx).copied().unwrap_or(-1);
        let profile = switch_mode_profile(mode);
        if !profile.binary_sensor {
            return None;
        }
        let (sensor_topic, status_topic) = if is_no_poll_mode(mode) {
            (None, None)
        } else {
            (
                Some(topics::tele_sensor_topic(device)),
                Some(topics::stat_status_topic(device, Some(10))),
            )
        };

        Some(Self {
            common: EntityCommon {
                endpoint: "switch",
                index: EntityIndex::Index(idx),
                friendly_name: Some(topics::switch_name(device, idx)),
                mac: device.mac.clone(),
                platform: Platform::BinarySensor,
                poll_topic: topics::command_status_topic(device),
                poll_payload: "10".to_string(),
            },
            availability: AvailabilityConfig::from_device(device),
            off_delay: profile.off_delay,
            state_power_off: topics::state_power_off(device),
            state_power_on: topics::state_power_on(device),
            result_topic: topics::stat_result_topic(device),
            sensor_topic,
            status_topic,
            switch_name: topics::switch_name(device, idx),
        })
    }
}

/// Generates the trigger configs for switch slot `idx`.
#[must_use]
pub fn get_switch_triggers(device: &DeviceDescriptor, idx: usize) -> Vec<TasmotaTriggerConfig> {
    let mode = device.switch_modes.get(idx).copied().unwrap_or(-1);
    let profile = switch_mode_profile(mode);
    let events = [
        (topics::state_name(device, topics::STATE_TOGGLE), profile.toggle_trigger),
        (topics::state_name(device, topics::STATE_HOLD), profile.hold_trigger),
    ];
    events
        .into_iter()
        .map(|(event, trigger_type)| TasmotaTriggerConfig {
            mac: device.mac.clone(),
            event,
            idx,
            source: TriggerSource::Switch,
            subtype: format!("switch_{}", idx + 1),
            trigger_topic: topics::stat_result_topic(device),
            trigger_type,
            match_key: topics::switch_name(device, idx),
        })
        .collect()
}
