// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic construction from a device's full-topic template.
//!
//! Tasmota builds every runtime topic from a configurable template
//! (`%prefix%/%topic%/` by default) with macros substituted per message
//! role. Command topics use the `cmnd` prefix, command results and polled
//! status use `stat`, periodic telemetry uses `tele`.

use crate::device::DeviceDescriptor;

/// Composite multi-command payload command.
pub(crate) const COMMAND_BACKLOG: &str = "Backlog";
/// Per-channel brightness command.
pub(crate) const COMMAND_CHANNEL: &str = "Channel";
/// RGB color command.
pub(crate) const COMMAND_COLOR: &str = "Color";
/// Color temperature command.
pub(crate) const COMMAND_CT: &str = "CT";
/// Brightness command.
pub(crate) const COMMAND_DIMMER: &str = "Dimmer";
/// Per-light fade enable command.
pub(crate) const COMMAND_FADE: &str = "Fade2";
/// Fan speed command.
pub(crate) const COMMAND_FANSPEED: &str = "FanSpeed";
/// Relay power command.
pub(crate) const COMMAND_POWER: &str = "Power";
/// Light effect scheme command.
pub(crate) const COMMAND_SCHEME: &str = "Scheme";
/// Per-light fade speed command.
pub(crate) const COMMAND_SPEED: &str = "Speed2";
/// White channel command.
pub(crate) const COMMAND_WHITE: &str = "White";

/// Index of the `cmnd` prefix in the `tp` list.
const PREFIX_CMND: usize = 0;
/// Index of the `stat` prefix in the `tp` list.
const PREFIX_STAT: usize = 1;
/// Index of the `tele` prefix in the `tp` list.
const PREFIX_TELE: usize = 2;

/// Index of the "off" literal in the `state` list.
pub(crate) const STATE_OFF: usize = 0;
/// Index of the "on" literal in the `state` list.
pub(crate) const STATE_ON: usize = 1;
/// Index of the "toggle" literal in the `state` list.
pub(crate) const STATE_TOGGLE: usize = 2;
/// Index of the "hold" literal in the `state` list.
pub(crate) const STATE_HOLD: usize = 3;

fn get_topic(device: &DeviceDescriptor, prefix_idx: usize) -> String {
    let prefix = device
        .prefixes
        .get(prefix_idx)
        .map_or("", String::as_str);
    // %id% is the short device id, the last six digits of the MAC.
    let id_start = device.mac.len().saturating_sub(6);
    device
        .full_topic
        .replace("%hostname%", &device.hostname)
        .replace("%id%", &device.mac[id_start..])
        .replace("%prefix%", prefix)
        .replace("%topic%", &device.topic)
}

/// Returns the command topic root (`cmnd` prefix, no suffix).
#[must_use]
pub fn command_topic(device: &DeviceDescriptor) -> String {
    get_topic(device, PREFIX_CMND)
}

/// Returns the topic used to poll runtime state (`cmnd` + `STATE`).
#[must_use]
pub fn command_state_topic(device: &DeviceDescriptor) -> String {
    get_topic(device, PREFIX_CMND) + "STATE"
}

/// Returns the topic used to poll status (`cmnd` + `STATUS`).
#[must_use]
pub fn command_status_topic(device: &DeviceDescriptor) -> String {
    get_topic(device, PREFIX_CMND) + "STATUS"
}

/// Returns the command result topic (`stat` + `RESULT`).
#[must_use]
pub fn stat_result_topic(device: &DeviceDescriptor) -> String {
    get_topic(device, PREFIX_STAT) + "RESULT"
}

/// Returns a polled status response topic (`stat` + `STATUS<n>`).
///
/// With `idx` of `None` the bare `STATUS` topic is returned.
#[must_use]
pub fn stat_status_topic(device: &DeviceDescriptor, idx: Option<u8>) -> String {
    match idx {
        Some(idx) => format!("{}STATUS{idx}", get_topic(device, PREFIX_STAT)),
        None => get_topic(device, PREFIX_STAT) + "STATUS",
    }
}

/// Returns the periodic state telemetry topic (`tele` + `STATE`).
#[must_use]
pub fn tele_state_topic(device: &DeviceDescriptor) -> String {
    get_topic(device, PREFIX_TELE) + "STATE"
}

/// Returns the periodic sensor telemetry topic (`tele` + `SENSOR`).
#[must_use]
pub fn tele_sensor_topic(device: &DeviceDescriptor) -> String {
    get_topic(device, PREFIX_TELE) + "SENSOR"
}

/// Returns the last-will availability topic (`tele` + `LWT`).
#[must_use]
pub fn tele_will_topic(device: &DeviceDescriptor) -> String {
    get_topic(device, PREFIX_TELE) + "LWT"
}

/// Returns the boot info telemetry topic (`tele` + `INFO3`).
///
/// Published once per boot; carries the restart reason.
#[must_use]
pub fn tele_info3_topic(device: &DeviceDescriptor) -> String {
    get_topic(device, PREFIX_TELE) + "INFO3"
}

/// Returns the friendly name for relay slot `idx`.
///
/// Falls back to `<device name> <idx+1>` when the slot has no name.
#[must_use]
pub fn friendly_name(device: &DeviceDescriptor, idx: usize) -> String {
    match device.friendly_names.get(idx) {
        Some(Some(name)) => name.clone(),
        _ => format!("{} {}", device.device_name, idx + 1),
    }
}

/// Returns the switch name for switch slot `idx`.
///
/// Tasmota addresses switch results by this name, so the fallback must
/// match the firmware's `Switch<n>` default.
#[must_use]
pub fn switch_name(device: &DeviceDescriptor, idx: usize) -> String {
    match device.switch_names.get(idx) {
        Some(Some(name)) => name.clone(),
        _ => format!("Switch{}", idx + 1),
    }
}

/// Returns the configured power "on" literal.
#[must_use]
pub fn state_power_on(device: &DeviceDescriptor) -> String {
    state_name(device, STATE_ON)
}

/// Returns the configured power "off" literal.
#[must_use]
pub fn state_power_off(device: &DeviceDescriptor) -> String {
    state_name(device, STATE_OFF)
}

/// Returns the state literal at `idx`, or the firmware default.
#[must_use]
pub fn state_name(device: &DeviceDescriptor, idx: usize) -> String {
    const DEFAULTS: [&str; 4] = ["OFF", "ON", "TOGGLE", "HOLD"];
    device
        .state_names
        .get(idx)
        .cloned()
        .unwrap_or_else(|| DEFAULTS.get(idx).map_or(String::new(), ToString::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_fixtures::PLUG_DISCOVERY;

    fn plug() -> DeviceDescriptor {
        serde_json::from_str(PLUG_DISCOVERY).unwrap()
    }

    #[test]
    fn command_topic_substitutes_template() {
        let device = plug();
        assert_eq!(command_topic(&device), "cmnd/tasmota_49A3BC/");
    }

    #[test]
    fn tele_topics() {
        let device = plug();
        assert_eq!(tele_state_topic(&device), "tele/tasmota_49A3BC/STATE");
        assert_eq!(tele_sensor_topic(&device), "tele/tasmota_49A3BC/SENSOR");
        assert_eq!(tele_will_topic(&device), "tele/tasmota_49A3BC/LWT");
        assert_eq!(tele_info3_topic(&device), "tele/tasmota_49A3BC/INFO3");
    }

    #[test]
    fn stat_topics() {
        let device = plug();
        assert_eq!(stat_result_topic(&device), "stat/tasmota_49A3BC/RESULT");
        assert_eq!(
            stat_status_topic(&device, Some(10)),
            "stat/tasmota_49A3BC/STATUS10"
        );
        assert_eq!(stat_status_topic(&device, None), "stat/tasmota_49A3BC/STATUS");
    }

    #[test]
    fn hostname_and_id_macros() {
        let mut device = plug();
        device.full_topic = "%hostname%/%id%/%prefix%/".to_string();
        assert_eq!(command_topic(&device), "tasmota-B94927/49A3BC/cmnd/");
    }

    #[test]
    fn friendly_name_fallback() {
        let device = plug();
        assert_eq!(friendly_name(&device, 0), "Plug");
        assert_eq!(friendly_name(&device, 1), "Plug 2");
        assert_eq!(friendly_name(&device, 9), "Plug 10");
    }

    #[test]
    fn switch_name_fallback() {
        let device = plug();
        assert_eq!(switch_name(&device, 0), "Switch1");
        assert_eq!(switch_name(&device, 2), "Switch3");
    }

    #[test]
    fn state_literals() {
        let device = plug();
        assert_eq!(state_power_on(&device), "ON");
        assert_eq!(state_power_off(&device), "OFF");
        assert_eq!(state_name(&device, STATE_TOGGLE), "TOGGLE");
        assert_eq!(state_name(&device, STATE_HOLD), "HOLD");
    }
}
