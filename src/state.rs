use serde::{Deserialize, Serialize};

/// Mode the device has been asked to run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    Cool,
    Heat,
    Auto,
    Off,
}

impl TargetMode {
    pub fn as_device_str(&self) -> &'static str {
        match self {
            TargetMode::Cool => "cool",
            TargetMode::Heat => "heat",
            TargetMode::Auto => "auto",
            TargetMode::Off => "off",
        }
    }

    pub fn from_device_str(s: &str) -> Option<Self> {
        match s {
            "cool" => Some(TargetMode::Cool),
            "heat" => Some(TargetMode::Heat),
            "auto" => Some(TargetMode::Auto),
            "off" => Some(TargetMode::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    Auto,
    Min,
    Max,
}

impl FanSpeed {
    /// Rotation-speed percentage shown for a device-reported fan speed.
    pub fn as_percent(&self) -> u8 {
        match self {
            FanSpeed::Auto => 50,
            FanSpeed::Min => 30,
            FanSpeed::Max => 100,
        }
    }

    /// Map a rotation-speed percentage back to a device fan speed.
    /// The bands are intentionally asymmetric versus [`as_percent`]:
    /// below 30 is min, above 80 is max, everything between is auto.
    ///
    /// [`as_percent`]: FanSpeed::as_percent
    pub fn from_percent(percent: f64) -> Self {
        if percent < 30.0 {
            FanSpeed::Min
        } else if percent > 80.0 {
            FanSpeed::Max
        } else {
            FanSpeed::Auto
        }
    }
}

/// Which swing axis the single SwingMode control drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingAxis {
    Vertical,
    Horizontal,
    #[default]
    Both,
}

/// Canonical device-reported status document.
///
/// The firmware always broadcasts the complete document, so every field is
/// required; a partial inbound message fails to deserialize and is skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub target_mode: TargetMode,
    pub vertical_swing: bool,
    pub horizontal_swing: bool,
    pub quiet_mode: bool,
    pub powerful_mode: bool,
    pub current_temperature: f64,
    pub current_humidity: f64,
    pub target_fan_speed: FanSpeed,
    pub target_temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingState {
    #[default]
    Inactive,
    Heating,
    Cooling,
}

/// Decomposed, control-ready view of the latest [`DeviceState`].
///
/// Regenerated wholesale on every inbound document via [`apply`]; never
/// authoritative on its own. The thresholds start at 25 and the un-routed
/// one keeps its previous value across updates, mirroring the device's
/// single setpoint.
///
/// [`apply`]: PresentationState::apply
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationState {
    pub active: bool,
    pub operating: OperatingState,
    /// Last non-off mode reported by the device. Used when re-activating.
    pub target: TargetMode,
    pub heating_threshold: f64,
    pub cooling_threshold: f64,
    pub current_temperature: f64,
    pub rotation_speed: u8,
    pub swing_enabled: bool,
    pub vertical_swing: bool,
    pub horizontal_swing: bool,
    pub quiet_mode: bool,
    pub powerful_mode: bool,
    pub humidity: f64,
}

impl Default for PresentationState {
    fn default() -> Self {
        Self {
            active: false,
            operating: OperatingState::Inactive,
            target: TargetMode::Auto,
            heating_threshold: 25.0,
            cooling_threshold: 25.0,
            current_temperature: 0.0,
            rotation_speed: FanSpeed::Auto.as_percent(),
            swing_enabled: false,
            vertical_swing: false,
            horizontal_swing: false,
            quiet_mode: false,
            powerful_mode: false,
            humidity: 0.0,
        }
    }
}

impl PresentationState {
    /// Rebuild the presentation from a device status document.
    ///
    /// Total over every mode. In auto mode the operating state is derived:
    /// cooling iff current temperature is strictly above the target, so the
    /// `current == target` boundary resolves to heating.
    pub fn apply(&mut self, state: &DeviceState, axis: SwingAxis) {
        match state.target_mode {
            TargetMode::Off => {
                self.active = false;
                self.operating = OperatingState::Inactive;
            }
            TargetMode::Cool => {
                self.active = true;
                self.operating = OperatingState::Cooling;
                self.target = TargetMode::Cool;
            }
            TargetMode::Heat => {
                self.active = true;
                self.operating = OperatingState::Heating;
                self.target = TargetMode::Heat;
            }
            TargetMode::Auto => {
                self.active = true;
                self.operating = if state.current_temperature > state.target_temperature {
                    OperatingState::Cooling
                } else {
                    OperatingState::Heating
                };
                self.target = TargetMode::Auto;
            }
        }

        // The single device setpoint surfaces through exactly one threshold
        // control depending on the mode.
        match state.target_mode {
            TargetMode::Auto | TargetMode::Heat => {
                self.heating_threshold = state.target_temperature;
            }
            TargetMode::Cool | TargetMode::Off => {
                self.cooling_threshold = state.target_temperature;
            }
        }

        self.current_temperature = state.current_temperature;
        self.rotation_speed = state.target_fan_speed.as_percent();

        self.swing_enabled = match axis {
            SwingAxis::Vertical => state.vertical_swing,
            SwingAxis::Horizontal => state.horizontal_swing,
            SwingAxis::Both => state.vertical_swing && state.horizontal_swing,
        };

        self.vertical_swing = state.vertical_swing;
        self.horizontal_swing = state.horizontal_swing;
        self.quiet_mode = state.quiet_mode;
        self.powerful_mode = state.powerful_mode;
        self.humidity = state.current_humidity;
    }
}
