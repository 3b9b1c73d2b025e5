//! Control intents → partial device command fragments.
//!
//! Every builder emits only the fields that change; the full state document
//! is never resent. The device applies a fragment and answers with a fresh
//! complete snapshot, which is what makes the loop converge.

use serde_json::{json, Value};

use crate::state::{FanSpeed, SwingAxis, TargetMode};

/// Which threshold control a temperature edit arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSlot {
    Heating,
    Cooling,
}

/// Auxiliary toggle descriptor: device attribute key + human-facing name.
/// One generic switch control is parameterized over this instead of a
/// bespoke handler per toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    VerticalSwing,
    HorizontalSwing,
    QuietMode,
    PowerfulMode,
}

impl Toggle {
    pub const ALL: [Toggle; 4] = [
        Toggle::VerticalSwing,
        Toggle::HorizontalSwing,
        Toggle::QuietMode,
        Toggle::PowerfulMode,
    ];

    pub fn attribute(&self) -> &'static str {
        match self {
            Toggle::VerticalSwing => "verticalSwing",
            Toggle::HorizontalSwing => "horizontalSwing",
            Toggle::QuietMode => "quietMode",
            Toggle::PowerfulMode => "powerfulMode",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Toggle::VerticalSwing => "Vertical Swing",
            Toggle::HorizontalSwing => "Horizontal Swing",
            Toggle::QuietMode => "Quiet Mode",
            Toggle::PowerfulMode => "Powerful Mode",
        }
    }
}

/// Setpoint range the firmware accepts, in whole degrees.
pub const TARGET_TEMPERATURE_MIN: f64 = 18.0;
pub const TARGET_TEMPERATURE_MAX: f64 = 30.0;

pub fn mode_fragment(mode: TargetMode) -> Value {
    json!({ "targetMode": mode.as_device_str() })
}

/// Setpoint edit → fragment, clamped to the device range and rounded to the
/// 1-degree step.
pub fn temperature_fragment(temperature: f64) -> Value {
    let setpoint = temperature
        .clamp(TARGET_TEMPERATURE_MIN, TARGET_TEMPERATURE_MAX)
        .round();
    json!({ "targetTemperature": setpoint })
}

/// Threshold edit → fragment, or `None` when the edit must be swallowed.
///
/// The device has a single setpoint. In auto mode it is exposed through the
/// heating-threshold control only, so cooling-threshold edits while in auto
/// are accepted but produce no command.
pub fn threshold_fragment(slot: ThresholdSlot, mode: TargetMode, temperature: f64) -> Option<Value> {
    if slot == ThresholdSlot::Cooling && mode == TargetMode::Auto {
        return None;
    }
    Some(temperature_fragment(temperature))
}

/// Rotation-speed edit → fragment, suppressed when the computed band equals
/// the last device-reported fan speed (avoids redundant traffic).
pub fn fan_fragment(current: FanSpeed, percent: f64) -> Option<Value> {
    let requested = FanSpeed::from_percent(percent);
    if requested == current {
        return None;
    }
    Some(json!({ "targetFanSpeed": requested }))
}

/// Swing edit → fragment for the configured axis preference. With `Both`,
/// both axes are set identically.
pub fn swing_fragment(axis: SwingAxis, enabled: bool) -> Value {
    match axis {
        SwingAxis::Vertical => json!({ "verticalSwing": enabled }),
        SwingAxis::Horizontal => json!({ "horizontalSwing": enabled }),
        SwingAxis::Both => json!({ "verticalSwing": enabled, "horizontalSwing": enabled }),
    }
}

pub fn toggle_fragment(toggle: Toggle, on: bool) -> Value {
    json!({ toggle.attribute(): on })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_fragment_is_partial() {
        let frag = mode_fragment(TargetMode::Off);
        assert_eq!(frag, json!({ "targetMode": "off" }));
        assert_eq!(frag.as_object().unwrap().len(), 1);
    }

    #[test]
    fn cooling_threshold_suppressed_in_auto() {
        assert!(threshold_fragment(ThresholdSlot::Cooling, TargetMode::Auto, 20.0).is_none());
        assert_eq!(
            threshold_fragment(ThresholdSlot::Cooling, TargetMode::Cool, 20.0),
            Some(json!({ "targetTemperature": 20.0 }))
        );
        assert_eq!(
            threshold_fragment(ThresholdSlot::Heating, TargetMode::Auto, 20.0),
            Some(json!({ "targetTemperature": 20.0 }))
        );
    }

    #[test]
    fn temperature_fragment_clamps_to_device_range() {
        assert_eq!(
            temperature_fragment(17.0),
            json!({ "targetTemperature": 18.0 })
        );
        assert_eq!(
            temperature_fragment(30.9),
            json!({ "targetTemperature": 30.0 })
        );
        assert_eq!(
            temperature_fragment(22.4),
            json!({ "targetTemperature": 22.0 })
        );
        assert_eq!(
            temperature_fragment(18.0),
            json!({ "targetTemperature": 18.0 })
        );
        assert_eq!(
            temperature_fragment(30.0),
            json!({ "targetTemperature": 30.0 })
        );
    }

    #[test]
    fn fan_fragment_suppresses_noop() {
        assert!(fan_fragment(FanSpeed::Auto, 50.0).is_none());
        assert_eq!(
            fan_fragment(FanSpeed::Auto, 29.0),
            Some(json!({ "targetFanSpeed": "min" }))
        );
        assert_eq!(
            fan_fragment(FanSpeed::Min, 81.0),
            Some(json!({ "targetFanSpeed": "max" }))
        );
    }

    #[test]
    fn swing_fragment_per_axis() {
        assert_eq!(
            swing_fragment(SwingAxis::Vertical, true),
            json!({ "verticalSwing": true })
        );
        assert_eq!(
            swing_fragment(SwingAxis::Horizontal, false),
            json!({ "horizontalSwing": false })
        );
        assert_eq!(
            swing_fragment(SwingAxis::Both, true),
            json!({ "verticalSwing": true, "horizontalSwing": true })
        );
    }

    #[test]
    fn toggle_fragment_uses_attribute_key() {
        assert_eq!(
            toggle_fragment(Toggle::QuietMode, true),
            json!({ "quietMode": true })
        );
        assert_eq!(
            toggle_fragment(Toggle::PowerfulMode, false),
            json!({ "powerfulMode": false })
        );
    }
}
