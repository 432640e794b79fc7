// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Light entities and the transition timing calculator.
//!
//! A Tasmota light channel is described by the device's light subtype plus
//! a handful of options that reshape it: multi-channel PWM splits one
//! subtype into independent dimmers, unlinked RGBW/RGBCW devices split into
//! an RGB light and a white/CT light, Tuya dimmers route brightness through
//! `Dimmer3`.
//!
//! State changes are committed as one `Backlog` publish so fade, speed,
//! brightness and color apply atomically, without visible intermediate
//! states.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::availability::{AvailabilityConfig, AvailabilityHandle};
use crate::device::DeviceDescriptor;
use crate::entity::{EntityCommon, EntityIndex, Platform};
use crate::error::ProtocolError;
use crate::mqtt::{Subscription, TasmotaMqttClient, TopicMap, TopicSlot};
use crate::payload::{PathNode, get_state_power, get_value_by_path, parse_json};
use crate::topics;
use crate::types::{ColorTemp, Dimmer, FadeSpeed, HsbColor, MiredRange};

/// Effects a Tasmota light can run, in `Scheme` command order.
pub const EFFECT_LIST: [&str; 5] = ["Solid", "Wake up", "Cycle up", "Cycle down", "Random"];

/// The channel layout of a light, ordered by capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LightKind {
    /// No light.
    None,
    /// Single dimmable channel.
    Single,
    /// Cold/warm white pair.
    ColdWarm,
    /// RGB channels.
    Rgb,
    /// RGB plus a white channel.
    Rgbw,
    /// RGB plus cold/warm white channels.
    Rgbcw,
}

impl LightKind {
    /// Maps a discovery light subtype to a kind.
    ///
    /// Unknown subtypes map to [`LightKind::None`].
    #[must_use]
    pub fn from_subtype(subtype: u8) -> Self {
        match subtype {
            1 => Self::Single,
            2 => Self::ColdWarm,
            3 => Self::Rgb,
            4 => Self::Rgbw,
            5 => Self::Rgbcw,
            0 => Self::None,
            other => {
                tracing::warn!(subtype = other, "Unknown light subtype");
                Self::None
            }
        }
    }

    /// Returns whether lights of this kind carry color channels.
    #[must_use]
    pub fn has_color(&self) -> bool {
        *self >= Self::Rgb
    }

    /// Returns whether lights of this kind carry a color temperature.
    #[must_use]
    pub fn has_color_temp(&self) -> bool {
        *self == Self::ColdWarm || *self == Self::Rgbcw
    }
}

/// Immutable configuration of one light entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasmotaLightConfig {
    /// Fields shared by all entities.
    pub common: EntityCommon,
    /// Availability wiring.
    pub availability: AvailabilityConfig,
    /// Relay slot backing this light.
    pub idx: usize,
    /// Command used to set brightness.
    pub dimmer_command: String,
    /// JSON key brightness is reported under.
    pub dimmer_state_key: String,
    /// Suffix appended to color commands ("=" keeps brightness unscaled).
    pub color_suffix: &'static str,
    /// Command topic root.
    pub command_topic: String,
    /// Brightness is driven through `Channel<n>` instead of `Dimmer`.
    pub control_by_channel: bool,
    /// `SetOption117`: fades run at fixed duration, not fixed slew rate.
    pub fade_fixed_duration: bool,
    /// Channel layout.
    pub kind: LightKind,
    /// Supported color temperature span.
    pub mired_range: MiredRange,
    /// `SetOption20`: brightness updates do not switch power on.
    pub not_power_linked: bool,
    /// Command result topic.
    pub result_topic: String,
    /// Configured "off" literal.
    pub state_power_off: String,
    /// Configured "on" literal.
    pub state_power_on: String,
    /// Periodic state telemetry topic.
    pub state_topic: String,
    /// Device is Tuya-based.
    pub tuya: bool,
}

impl TasmotaLightConfig {
    /// Derives the config for the light at relay slot `idx`.
    #[must_use]
    pub fn from_discovery(device: &DeviceDescriptor, idx: usize) -> Self {
        let mut color_suffix = "";
        let mut dimmer_command = topics::COMMAND_DIMMER.to_string();
        let mut dimmer_state_key = topics::COMMAND_DIMMER.to_string();
        let mut control_by_channel = false;
        if device.tuya != 0 {
            // Tuya dimmers take brightness through Dimmer3.
            dimmer_command = format!("{}3", topics::COMMAND_DIMMER);
        }
        let subtype = LightKind::from_subtype(device.light_subtype);
        let mut kind = subtype;

        if device.options.pwm_multi_channels != 0 {
            // Each PWM channel is its own dimmer, driven through Channel<n>.
            dimmer_state_key = format!("{}{}", topics::COMMAND_CHANNEL, idx + 1);
            control_by_channel = true;
            kind = LightKind::Single;
        } else if device.link_rgb_ct == 0 && subtype >= LightKind::Rgbw {
            // Unlinked: the device splits into RGB (first slot) and
            // white/CT (second slot) lights with separate dimmers.
            let first_light = device.first_light_relay().unwrap_or(0);
            let mut dimmer_idx = 1;
            if idx == first_light {
                kind = LightKind::Rgb;
                color_suffix = "=";
            }
            if idx == first_light + 1 {
                dimmer_idx = 2;
                kind = if subtype == LightKind::Rgbw {
                    LightKind::Single
                } else {
                    LightKind::ColdWarm
                };
            }
            dimmer_command = format!("{}{dimmer_idx}", topics::COMMAND_DIMMER);
            dimmer_state_key = dimmer_command.clone();
        }

        let mired_range = if device.options.reduced_ct_range != 0 {
            MiredRange::REDUCED
        } else {
            MiredRange::DEFAULT
        };

        Self {
            common: EntityCommon {
                endpoint: "light",
                index: EntityIndex::Index(idx),
                friendly_name: Some(topics::friendly_name(device, idx)),
                mac: device.mac.clone(),
                platform: Platform::Light,
                poll_topic: topics::command_state_topic(device),
                poll_payload: String::new(),
            },
            availability: AvailabilityConfig::from_device(device),
            idx,
            dimmer_command,
            dimmer_state_key,
            color_suffix,
            command_topic: topics::command_topic(device),
            control_by_channel,
            fade_fixed_duration: device.options.fade_fixed_duration != 0,
            kind,
            mired_range,
            not_power_linked: device.options.not_power_linked != 0,
            result_topic: topics::stat_result_topic(device),
            state_power_off: topics::state_power_off(device),
            state_power_on: topics::state_power_on(device),
            state_topic: topics::tele_state_topic(device),
            tuya: device.tuya != 0,
        }
    }
}

/// One side of a transition, normalized for the calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightChannels {
    /// Whether the light is (or should be) on.
    pub on: bool,
    /// Brightness percentage, if known or requested.
    pub brightness: Option<u8>,
    /// RGB components in 0-255, if known or requested.
    pub color: Option<[f32; 3]>,
    /// Color temperature in mireds, if known or requested.
    pub color_temp: Option<u16>,
}

/// Computes the device fade speed for a requested transition.
///
/// The device exposes one global fade-rate scalar in half-seconds per full
/// 0-100% change. Driving it off the channel with the largest normalized
/// change makes every channel complete within the requested duration.
///
/// With `fade_fixed_duration` the device itself scales the slew rate, so
/// the duration maps directly. Otherwise every active channel — brightness,
/// RGB components scaled by the effective brightness, color temperature as
/// a fraction of the supported mired range — is normalized to 0..1 and the
/// maximum absolute difference picks the speed.
///
/// Returns `None` when nothing changes; no speed command should be sent.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn calculate_fade_speed(
    transition: f32,
    fade_fixed_duration: bool,
    kind: LightKind,
    mired_range: MiredRange,
    current: &LightChannels,
    target: &LightChannels,
) -> Option<FadeSpeed> {
    if fade_fixed_duration {
        return Some(FadeSpeed::clamped((transition * 2.0).round().clamp(1.0, 40.0) as u8));
    }

    let old_brightness = f32::from(current.brightness.unwrap_or(100));
    let now_brightness = if current.on { old_brightness } else { 0.0 };
    let new_brightness = target.brightness.map_or_else(
        || if target.on { old_brightness } else { 0.0 },
        f32::from,
    );

    let mut now_channels: Vec<f32> = Vec::new();
    let mut new_channels: Vec<f32> = Vec::new();

    if kind >= LightKind::ColdWarm {
        if kind >= LightKind::Rgb
            && let Some(now_color) = current.color
        {
            let new_color = target.color.unwrap_or(now_color);
            now_channels.extend(now_color.iter().map(|c| c / 255.0));
            new_channels.extend(new_color.iter().map(|c| c / 255.0));
        }
        if let Some(now_ct) = current.color_temp {
            let new_ct = target.color_temp.unwrap_or(now_ct);
            now_channels.push(mired_range.fraction(now_ct));
            new_channels.push(mired_range.fraction(new_ct));
        }
        for channel in &mut now_channels {
            *channel *= now_brightness / 100.0;
        }
        for channel in &mut new_channels {
            *channel *= new_brightness / 100.0;
        }
    }

    // Single-channel dimmer, or color / color temperature never seen.
    if new_channels.is_empty() {
        now_channels.push(now_brightness / 100.0);
        new_channels.push(new_brightness / 100.0);
    }

    let delta = now_channels
        .iter()
        .zip(&new_channels)
        .map(|(now, new)| (now - new).abs())
        .fold(0.0_f32, f32::max);

    if delta == 0.0 {
        return None;
    }
    Some(FadeSpeed::clamped(
        (transition * 2.0 / delta).round().clamp(1.0, 40.0) as u8,
    ))
}

/// A requested light state change.
#[derive(Debug, Clone, Default)]
pub struct LightRequest {
    /// Whether the light should be on.
    pub on: bool,
    /// Requested brightness.
    pub brightness: Option<Dimmer>,
    /// Requested RGB color in 0-255 components.
    pub color: Option<[f32; 3]>,
    /// Requested hue and saturation (the brightness part is ignored;
    /// brightness travels separately).
    pub color_hs: Option<HsbColor>,
    /// Requested color temperature.
    pub color_temp: Option<ColorTemp>,
    /// Requested effect, one of [`EFFECT_LIST`].
    pub effect: Option<String>,
    /// Requested white channel value.
    pub white_value: Option<u8>,
    /// Requested transition duration in seconds.
    pub transition: Option<f32>,
}

/// State attributes reported alongside an on/off update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightUpdate {
    /// Reported brightness percentage.
    pub brightness: Option<u8>,
    /// Reported RGB color.
    pub color: Option<[f32; 3]>,
    /// Reported hue and saturation.
    pub color_hs: Option<(f32, f32)>,
    /// Reported color temperature in mireds.
    pub color_temp: Option<u16>,
    /// Reported effect name.
    pub effect: Option<String>,
    /// Reported white channel value.
    pub white_value: Option<u8>,
}

/// Callback invoked with the on/off state and reported attributes.
pub type LightCallback = Box<dyn Fn(bool, &LightUpdate) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
struct LightSnapshot {
    on: Option<bool>,
    brightness: Option<u8>,
    color: Option<[f32; 3]>,
    color_temp: Option<u16>,
}

/// Runtime representation of one light entity.
pub struct TasmotaLight {
    cfg: TasmotaLightConfig,
    client: Arc<TasmotaMqttClient>,
    availability: AvailabilityHandle,
    snapshot: Arc<Mutex<LightSnapshot>>,
    on_state: Arc<RwLock<Option<LightCallback>>>,
    sub_state: tokio::sync::Mutex<Option<Subscription>>,
}

impl TasmotaLight {
    /// Creates the runtime entity for a light config.
    #[must_use]
    pub fn new(cfg: TasmotaLightConfig, client: Arc<TasmotaMqttClient>) -> Self {
        let availability = AvailabilityHandle::new(
            Arc::clone(&client),
            cfg.availability.clone(),
            cfg.common.poll_topic.clone(),
            cfg.common.poll_payload.clone(),
        );
        Self {
            cfg,
            client,
            availability,
            snapshot: Arc::new(Mutex::new(LightSnapshot::default())),
            on_state: Arc::new(RwLock::new(None)),
            sub_state: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns the entity's immutable config.
    #[must_use]
    pub fn config(&self) -> &TasmotaLightConfig {
        &self.cfg
    }

    /// Returns the entity's unique id.
    #[must_use]
    pub fn unique_id(&self) -> String {
        self.cfg.common.unique_id()
    }

    /// Returns the availability sub-object.
    #[must_use]
    pub fn availability(&self) -> &AvailabilityHandle {
        &self.availability
    }

    /// Returns whether smooth transitions can be requested.
    ///
    /// Tuya lights apply their own ramping and reject speed commands.
    #[must_use]
    pub fn supports_transition(&self) -> bool {
        self.cfg.kind != LightKind::None && !self.cfg.tuya
    }

    /// Sets the callback fired on reported state changes.
    pub fn set_on_state<F>(&self, callback: F)
    where
        F: Fn(bool, &LightUpdate) + Send + Sync + 'static,
    {
        *self.on_state.write() = Some(Box::new(callback));
    }

    /// Requests a debounced state re-poll.
    pub fn poll_status(&self) {
        self.availability.poll_status();
    }

    /// Subscribes the result, state and availability topics.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn subscribe_topics(&self) -> Result<(), ProtocolError> {
        let handler = state_handler(
            self.cfg.clone(),
            Arc::clone(&self.snapshot),
            Arc::clone(&self.on_state),
        );
        let mut map = TopicMap::new();
        map.insert(TopicSlot::Result, self.cfg.result_topic.clone(), Arc::clone(&handler));
        map.insert(TopicSlot::State, self.cfg.state_topic.clone(), handler);
        self.availability.fill_topic_map(&mut map);

        let mut sub = self.sub_state.lock().await;
        *sub = Some(self.client.subscribe(sub.take(), map).await?);
        Ok(())
    }

    /// Unsubscribes every topic of this entity.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn unsubscribe_topics(&self) -> Result<(), ProtocolError> {
        let mut sub = self.sub_state.lock().await;
        *sub = Some(self.client.unsubscribe(sub.take()).await?);
        Ok(())
    }

    /// Commits a light state change as one atomic `Backlog` publish.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub async fn set_state(&self, request: &LightRequest) -> Result<(), ProtocolError> {
        let cfg = &self.cfg;
        let mut commands: Vec<(String, String)> = Vec::new();

        let transition = request.transition.unwrap_or(0.0);
        let do_transition = transition > 0.0;

        if self.supports_transition() && request.transition.is_some() {
            commands.push((
                topics::COMMAND_FADE.to_string(),
                if do_transition { "1" } else { "0" }.to_string(),
            ));
        }

        if do_transition {
            let snapshot = *self.snapshot.lock();
            let current = LightChannels {
                on: snapshot.on.unwrap_or(false),
                brightness: snapshot.brightness,
                color: snapshot.color,
                color_temp: snapshot.color_temp,
            };
            let target = LightChannels {
                on: request.on,
                brightness: request.brightness.map(|d| d.value()),
                color: request
                    .color
                    .or_else(|| request.color_hs.map(|hsb| hsb.to_rgb())),
                color_temp: request.color_temp.map(|c| c.value()),
            };
            if let Some(speed) = calculate_fade_speed(
                transition,
                cfg.fade_fixed_duration,
                cfg.kind,
                cfg.mired_range,
                &current,
                &target,
            ) {
                commands.push((topics::COMMAND_SPEED.to_string(), speed.to_string()));
            }
        }

        let power_payload = if request.on {
            cfg.state_power_on.clone()
        } else {
            cfg.state_power_off.clone()
        };
        if let Some(brightness) = request.brightness {
            let command = if cfg.control_by_channel {
                format!("{}{}", topics::COMMAND_CHANNEL, cfg.idx + 1)
            } else {
                cfg.dimmer_command.clone()
            };
            commands.push((command, brightness.value().to_string()));
        } else {
            commands.push((
                format!("{}{}", topics::COMMAND_POWER, cfg.idx + 1),
                power_payload.clone(),
            ));
        }

        if let Some(color) = request.color {
            commands.push((
                format!("{}2", topics::COMMAND_COLOR),
                format!(
                    "{},{},{}{}",
                    color[0].round() as u16,
                    color[1].round() as u16,
                    color[2].round() as u16,
                    cfg.color_suffix
                ),
            ));
        }
        if let Some(hsb) = request.color_hs {
            commands.push(("HsbColor1".to_string(), hsb.hue().to_string()));
            commands.push(("HsbColor2".to_string(), hsb.saturation().to_string()));
        }
        if let Some(color_temp) = request.color_temp {
            commands.push((topics::COMMAND_CT.to_string(), color_temp.value().to_string()));
        }
        if let Some(effect) = &request.effect {
            if let Some(scheme) = EFFECT_LIST.iter().position(|e| *e == effect.as_str()) {
                commands.push((topics::COMMAND_SCHEME.to_string(), scheme.to_string()));
            } else {
                tracing::debug!(effect = %effect, "Unknown effect");
            }
        }
        if let Some(white) = request.white_value {
            commands.push((topics::COMMAND_WHITE.to_string(), white.to_string()));
        }

        if cfg.not_power_linked && request.brightness.is_some() {
            // Brightness alone leaves power untouched; always send it.
            commands.push((
                format!("{}{}", topics::COMMAND_POWER, cfg.idx + 1),
                power_payload,
            ));
        }

        self.client.send_backlog(&cfg.command_topic, &commands).await
    }
}

impl std::fmt::Debug for TasmotaLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TasmotaLight")
            .field("unique_id", &self.unique_id())
            .field("kind", &self.cfg.kind)
            .finish()
    }
}

/// Builds the shared result/state message handler for one light.
fn state_handler(
    cfg: TasmotaLightConfig,
    snapshot: Arc<Mutex<LightSnapshot>>,
    on_state: Arc<RwLock<Option<LightCallback>>>,
) -> crate::mqtt::MessageHandler {
    Arc::new(move |msg| {
        let Some(json) = parse_json(&msg.payload) else {
            return;
        };

        let mut update = LightUpdate::default();
        if cfg.kind != LightKind::None {
            if let Some(brightness) = get_value_by_path(&json, &[PathNode::key(&cfg.dimmer_state_key)])
                .and_then(serde_json::Value::as_u64)
            {
                let brightness = u8::try_from(brightness.min(100)).unwrap_or(100);
                snapshot.lock().brightness = Some(brightness);
                update.brightness = Some(brightness);
            }

            if let Some(color) = get_value_by_path(&json, &[PathNode::key(topics::COMMAND_COLOR)])
                .and_then(serde_json::Value::as_str)
                .and_then(parse_color)
            {
                snapshot.lock().color = Some(color);
                update.color = Some(color);
            }

            if let Some(hsb) = get_value_by_path(&json, &[PathNode::key("HSBColor")])
                .and_then(serde_json::Value::as_str)
            {
                let parts: Vec<f32> = hsb
                    .splitn(3, ',')
                    .filter_map(|part| part.parse().ok())
                    .collect();
                if parts.len() == 3 {
                    update.color_hs = Some((parts[0], parts[1]));
                }
            }

            if let Some(color_temp) = get_value_by_path(&json, &[PathNode::key(topics::COMMAND_CT)])
                .and_then(serde_json::Value::as_u64)
            {
                let color_temp = u16::try_from(color_temp).unwrap_or(u16::MAX);
                snapshot.lock().color_temp = Some(color_temp);
                update.color_temp = Some(color_temp);
            }

            if let Some(scheme) = get_value_by_path(&json, &[PathNode::key(topics::COMMAND_SCHEME)])
                .and_then(serde_json::Value::as_u64)
            {
                #[allow(clippy::cast_possible_truncation)]
                let scheme = scheme as usize;
                update.effect = Some(
                    EFFECT_LIST
                        .get(scheme)
                        .map_or_else(|| format!("Scheme {scheme}"), ToString::to_string),
                );
            }

            if let Some(white) = get_value_by_path(&json, &[PathNode::key(topics::COMMAND_WHITE)])
                .and_then(serde_json::Value::as_u64)
            {
                update.white_value = Some(u8::try_from(white.min(100)).unwrap_or(100));
            }
        }

        let Some(state) = get_state_power(&json, cfg.idx) else {
            return;
        };
        let on = if state == cfg.state_power_on {
            true
        } else if state == cfg.state_power_off {
            false
        } else {
            return;
        };
        snapshot.lock().on = Some(on);
        if let Some(callback) = on_state.read().as_ref() {
            callback(on, &update);
        }
    })
}

/// Parses a reported `Color` value.
///
/// The device reports either comma-separated decimals (`SetOption17`) or
/// packed hex pairs, with optional extra white channels that are ignored.
fn parse_color(color: &str) -> Option<[f32; 3]> {
    let parts: Vec<f32> = if color.contains(',') {
        color
            .split(',')
            .filter_map(|part| part.parse().ok())
            .collect()
    } else {
        color
            .as_bytes()
            .chunks(2)
            .filter_map(|pair| {
                let pair = std::str::from_utf8(pair).ok()?;
                u8::from_str_radix(pair, 16).ok().map(f32::from)
            })
            .collect()
    };
    if parts.len() >= 3 {
        Some([parts[0], parts[1], parts[2]])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_fixtures::{BULB_DISCOVERY, PLUG_DISCOVERY};
    use crate::mqtt::MqttTransport;
    use crate::mqtt::test_transport::RecordingTransport;

    fn bulb() -> DeviceDescriptor {
        serde_json::from_str(BULB_DISCOVERY).unwrap()
    }

    #[test]
    fn kind_ordering() {
        assert!(LightKind::Rgbcw > LightKind::Rgb);
        assert!(LightKind::ColdWarm > LightKind::Single);
        assert!(LightKind::Rgb.has_color());
        assert!(!LightKind::ColdWarm.has_color());
        assert!(LightKind::Rgbcw.has_color_temp());
        assert!(!LightKind::Rgbw.has_color_temp());
    }

    #[test]
    fn config_linked_rgbcw() {
        let cfg = TasmotaLightConfig::from_discovery(&bulb(), 0);
        assert_eq!(cfg.kind, LightKind::Rgbcw);
        assert_eq!(cfg.dimmer_command, "Dimmer");
        assert_eq!(cfg.dimmer_state_key, "Dimmer");
        assert_eq!(cfg.color_suffix, "");
        assert!(!cfg.control_by_channel);
        assert_eq!(cfg.mired_range, MiredRange::DEFAULT);
        assert_eq!(cfg.common.unique_id(), "000000112233_light_light_0");
    }

    #[test]
    fn config_split_rgbcw() {
        let mut device = bulb();
        device.link_rgb_ct = 0;
        device.relays = vec![2, 2];

        let rgb = TasmotaLightConfig::from_discovery(&device, 0);
        assert_eq!(rgb.kind, LightKind::Rgb);
        assert_eq!(rgb.color_suffix, "=");
        assert_eq!(rgb.dimmer_command, "Dimmer1");

        let white = TasmotaLightConfig::from_discovery(&device, 1);
        assert_eq!(white.kind, LightKind::ColdWarm);
        assert_eq!(white.dimmer_command, "Dimmer2");
    }

    #[test]
    fn config_split_rgbw_second_light_is_dimmer() {
        let mut device = bulb();
        device.link_rgb_ct = 0;
        device.light_subtype = 4;
        device.relays = vec![2, 2];

        let white = TasmotaLightConfig::from_discovery(&device, 1);
        assert_eq!(white.kind, LightKind::Single);
    }

    #[test]
    fn config_pwm_multi_channels() {
        let mut device = bulb();
        device.options.pwm_multi_channels = 1;
        device.relays = vec![2, 2, 2];

        let cfg = TasmotaLightConfig::from_discovery(&device, 1);
        assert_eq!(cfg.kind, LightKind::Single);
        assert!(cfg.control_by_channel);
        assert_eq!(cfg.dimmer_state_key, "Channel2");
    }

    #[test]
    fn config_tuya_dimmer() {
        let mut device = bulb();
        device.tuya = 1;
        device.light_subtype = 1;
        let cfg = TasmotaLightConfig::from_discovery(&device, 0);
        assert_eq!(cfg.dimmer_command, "Dimmer3");
        assert!(cfg.tuya);
    }

    #[test]
    fn config_reduced_ct_range() {
        let mut device = bulb();
        device.options.reduced_ct_range = 1;
        let cfg = TasmotaLightConfig::from_discovery(&device, 0);
        assert_eq!(cfg.mired_range, MiredRange::REDUCED);
    }

    #[test]
    fn fade_speed_full_dimmer_sweep() {
        // 4 second transition over a full 0 -> 100% change.
        let current = LightChannels {
            on: false,
            brightness: Some(0),
            ..Default::default()
        };
        let target = LightChannels {
            on: true,
            brightness: Some(100),
            ..Default::default()
        };
        let speed = calculate_fade_speed(
            4.0,
            false,
            LightKind::Single,
            MiredRange::DEFAULT,
            &current,
            &target,
        );
        assert_eq!(speed, Some(FadeSpeed::new(8).unwrap()));
    }

    #[test]
    fn fade_speed_scales_with_partial_change() {
        // Half the sweep in the same time runs at half the rate.
        let current = LightChannels {
            on: true,
            brightness: Some(100),
            ..Default::default()
        };
        let target = LightChannels {
            on: true,
            brightness: Some(50),
            ..Default::default()
        };
        let speed = calculate_fade_speed(
            4.0,
            false,
            LightKind::Single,
            MiredRange::DEFAULT,
            &current,
            &target,
        );
        assert_eq!(speed, Some(FadeSpeed::new(16).unwrap()));
    }

    #[test]
    fn fade_speed_fixed_duration_ignores_magnitude() {
        let current = LightChannels {
            on: true,
            brightness: Some(99),
            ..Default::default()
        };
        let target = LightChannels {
            on: true,
            brightness: Some(100),
            ..Default::default()
        };
        let speed = calculate_fade_speed(
            4.0,
            true,
            LightKind::Single,
            MiredRange::DEFAULT,
            &current,
            &target,
        );
        assert_eq!(speed, Some(FadeSpeed::new(8).unwrap()));
    }

    #[test]
    fn fade_speed_no_change_is_none() {
        let channels = LightChannels {
            on: true,
            brightness: Some(80),
            ..Default::default()
        };
        let speed = calculate_fade_speed(
            4.0,
            false,
            LightKind::Single,
            MiredRange::DEFAULT,
            &channels,
            &channels,
        );
        assert_eq!(speed, None);
    }

    #[test]
    fn fade_speed_clamps_to_range() {
        let current = LightChannels {
            on: false,
            brightness: Some(0),
            ..Default::default()
        };
        let target = LightChannels {
            on: true,
            brightness: Some(100),
            ..Default::default()
        };
        // 30s over a full sweep would be speed 60.
        let slow = calculate_fade_speed(
            30.0,
            false,
            LightKind::Single,
            MiredRange::DEFAULT,
            &current,
            &target,
        );
        assert_eq!(slow, Some(FadeSpeed::new(40).unwrap()));

        // 0.1s rounds to 0 and clamps up.
        let fast = calculate_fade_speed(
            0.1,
            false,
            LightKind::Single,
            MiredRange::DEFAULT,
            &current,
            &target,
        );
        assert_eq!(fast, Some(FadeSpeed::new(1).unwrap()));
    }

    #[test]
    fn fade_speed_tracks_largest_channel_change() {
        // Red -> green at constant brightness: red and green channels both
        // sweep fully, so the delta is 1.0.
        let current = LightChannels {
            on: true,
            brightness: Some(100),
            color: Some([255.0, 0.0, 0.0]),
            color_temp: None,
        };
        let target = LightChannels {
            on: true,
            brightness: Some(100),
            color: Some([0.0, 255.0, 0.0]),
            color_temp: None,
        };
        let speed = calculate_fade_speed(
            4.0,
            false,
            LightKind::Rgb,
            MiredRange::DEFAULT,
            &current,
            &target,
        );
        assert_eq!(speed, Some(FadeSpeed::new(8).unwrap()));
    }

    #[test]
    fn fade_speed_unknown_color_falls_back_to_brightness() {
        // Color capable light without a known color: brightness only.
        let current = LightChannels {
            on: true,
            brightness: Some(100),
            color: None,
            color_temp: None,
        };
        let target = LightChannels {
            on: true,
            brightness: Some(0),
            color: None,
            color_temp: None,
        };
        let speed = calculate_fade_speed(
            2.0,
            false,
            LightKind::Rgbcw,
            MiredRange::DEFAULT,
            &current,
            &target,
        );
        assert_eq!(speed, Some(FadeSpeed::new(4).unwrap()));
    }

    #[test]
    fn fade_speed_color_temp_channel() {
        let current = LightChannels {
            on: true,
            brightness: Some(100),
            color: None,
            color_temp: Some(153),
        };
        let target = LightChannels {
            on: true,
            brightness: Some(100),
            color: None,
            color_temp: Some(500),
        };
        let speed = calculate_fade_speed(
            4.0,
            false,
            LightKind::ColdWarm,
            MiredRange::DEFAULT,
            &current,
            &target,
        );
        assert_eq!(speed, Some(FadeSpeed::new(8).unwrap()));
    }

    #[test]
    fn parse_color_decimal_and_hex() {
        assert_eq!(parse_color("255,128,0"), Some([255.0, 128.0, 0.0]));
        assert_eq!(parse_color("FF8000"), Some([255.0, 128.0, 0.0]));
        // RGBW hex: extra channel ignored.
        assert_eq!(parse_color("FF800000"), Some([255.0, 128.0, 0.0]));
        assert_eq!(parse_color("FF"), None);
    }

    #[tokio::test]
    async fn set_state_sends_backlog_with_fade_and_speed() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(TasmotaMqttClient::new(
            Arc::clone(&transport) as Arc<dyn MqttTransport>
        ));
        let mut cfg = TasmotaLightConfig::from_discovery(&bulb(), 0);
        cfg.kind = LightKind::Single;
        let light = TasmotaLight::new(cfg, client);

        light
            .set_state(&LightRequest {
                on: true,
                brightness: Some(Dimmer::FULL),
                transition: Some(4.0),
                ..Default::default()
            })
            .await
            .unwrap();

        let published = transport.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "cmnd/tasmota_112233/Backlog");
        // Unknown previous state: off with assumed full brightness, so the
        // full sweep in 4 seconds runs at speed 8.
        assert_eq!(
            published[0].payload,
            "NoDelay;Fade2 1;NoDelay;Speed2 8;NoDelay;Dimmer 100"
        );
    }

    #[tokio::test]
    async fn set_state_skips_speed_when_nothing_changes() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(TasmotaMqttClient::new(
            Arc::clone(&transport) as Arc<dyn MqttTransport>
        ));
        let mut cfg = TasmotaLightConfig::from_discovery(&bulb(), 0);
        cfg.kind = LightKind::Single;
        let light = TasmotaLight::new(cfg, client);
        light.snapshot.lock().on = Some(true);
        light.snapshot.lock().brightness = Some(80);

        light
            .set_state(&LightRequest {
                on: true,
                brightness: Some(Dimmer::new(80).unwrap()),
                transition: Some(4.0),
                ..Default::default()
            })
            .await
            .unwrap();

        let published = transport.published.lock();
        assert_eq!(published[0].payload, "NoDelay;Fade2 1;NoDelay;Dimmer 80");
    }

    #[tokio::test]
    async fn set_state_power_only() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(TasmotaMqttClient::new(
            Arc::clone(&transport) as Arc<dyn MqttTransport>
        ));
        let cfg = TasmotaLightConfig::from_discovery(&bulb(), 0);
        let light = TasmotaLight::new(cfg, client);

        light
            .set_state(&LightRequest {
                on: false,
                ..Default::default()
            })
            .await
            .unwrap();

        let published = transport.published.lock();
        assert_eq!(published[0].payload, "NoDelay;Power1 OFF");
    }

    #[tokio::test]
    async fn set_state_not_power_linked_appends_power() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(TasmotaMqttClient::new(
            Arc::clone(&transport) as Arc<dyn MqttTransport>
        ));
        let mut cfg = TasmotaLightConfig::from_discovery(&bulb(), 0);
        cfg.not_power_linked = true;
        let light = TasmotaLight::new(cfg, client);

        light
            .set_state(&LightRequest {
                on: true,
                brightness: Some(Dimmer::new(60).unwrap()),
                ..Default::default()
            })
            .await
            .unwrap();

        let published = transport.published.lock();
        assert_eq!(published[0].payload, "NoDelay;Dimmer 60;NoDelay;Power1 ON");
    }

    #[tokio::test]
    async fn state_message_updates_snapshot_and_callback() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(TasmotaMqttClient::new(
            Arc::clone(&transport) as Arc<dyn MqttTransport>
        ));
        let cfg = TasmotaLightConfig::from_discovery(&bulb(), 0);
        let light = TasmotaLight::new(cfg, Arc::clone(&client));

        let received: Arc<Mutex<Vec<(bool, LightUpdate)>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        light.set_on_state(move |on, update| {
            received_clone.lock().push((on, update.clone()));
        });
        light.subscribe_topics().await.unwrap();

        client.handle_message(
            "tele/tasmota_112233/STATE",
            r#"{"POWER":"ON","Dimmer":75,"Color":"255,0,0","CT":300,"Scheme":4}"#,
            0,
            false,
        );

        let received = received.lock();
        assert_eq!(received.len(), 1);
        let (on, update) = &received[0];
        assert!(on);
        assert_eq!(update.brightness, Some(75));
        assert_eq!(update.color, Some([255.0, 0.0, 0.0]));
        assert_eq!(update.color_temp, Some(300));
        assert_eq!(update.effect.as_deref(), Some("Random"));
        assert_eq!(light.snapshot.lock().brightness, Some(75));
    }

    #[tokio::test]
    async fn state_message_without_power_is_dropped() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(TasmotaMqttClient::new(
            Arc::clone(&transport) as Arc<dyn MqttTransport>
        ));
        let cfg = TasmotaLightConfig::from_discovery(&bulb(), 0);
        let light = TasmotaLight::new(cfg, Arc::clone(&client));

        let count = Arc::new(Mutex::new(0u32));
        let count_clone = Arc::clone(&count);
        light.set_on_state(move |_, _| {
            *count_clone.lock() += 1;
        });
        light.subscribe_topics().await.unwrap();

        client.handle_message("tele/tasmota_112233/STATE", r#"{"Dimmer":50}"#, 0, false);
        client.handle_message("tele/tasmota_112233/STATE", "not json", 0, false);
        assert_eq!(*count.lock(), 0);
        // The dimmer value is still remembered for later transitions.
        assert_eq!(light.snapshot.lock().brightness, Some(50));
    }

    #[test]
    fn plug_has_no_light_kind() {
        let device: DeviceDescriptor = serde_json::from_str(PLUG_DISCOVERY).unwrap();
        assert_eq!(LightKind::from_subtype(device.light_subtype), LightKind::None);
    }
}
