//! Heater-cooler controller: one per device, wiring the session's inbound
//! document stream to the accessory's control surfaces and turning
//! control-set operations into outbound command fragments.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::registry::{characteristic, service, value, AccessoryHandle, Registry};
use crate::session::{DeviceSession, SessionEvent};
use crate::state::{DeviceState, FanSpeed, OperatingState, PresentationState, SwingAxis, TargetMode};
use crate::translate::{self, ThresholdSlot, Toggle};
use crate::{Error, Result};

/// Delay between an activate request and re-issuing the last mode, giving an
/// in-flight status document a chance to land first.
const ACTIVATE_DELAY: Duration = Duration::from_secs(1);

const MANUFACTURER: &str = "oznu-platform";
const MODEL: &str = "daikin-esp8266";

struct ControlState {
    presentation: PresentationState,
    /// Last device-reported fan speed, for outbound no-op suppression.
    fan: FanSpeed,
}

pub struct HeaterCooler {
    name: String,
    axis: SwingAxis,
    session: Arc<DeviceSession>,
    registry: Arc<dyn Registry>,
    handle: AccessoryHandle,
    state: Arc<Mutex<ControlState>>,
}

impl HeaterCooler {
    /// Attach the control surfaces and start consuming the session's event
    /// stream. The inbound task lives until the session shuts down.
    pub fn start(
        name: impl Into<String>,
        serial: &str,
        axis: SwingAxis,
        session: Arc<DeviceSession>,
        registry: Arc<dyn Registry>,
        handle: AccessoryHandle,
    ) -> Arc<Self> {
        let name = name.into();

        registry.ensure_service(handle, service::INFORMATION, None);
        registry.update(
            handle,
            service::INFORMATION,
            characteristic::MANUFACTURER,
            json!(MANUFACTURER),
        );
        registry.update(handle, service::INFORMATION, characteristic::MODEL, json!(MODEL));
        registry.update(
            handle,
            service::INFORMATION,
            characteristic::SERIAL_NUMBER,
            json!(serial),
        );

        registry.ensure_service(handle, service::HEATER_COOLER, None);
        for toggle in Toggle::ALL {
            registry.ensure_service(handle, toggle.display_name(), Some(toggle.attribute()));
        }
        registry.ensure_service(handle, "Humidity", Some("humidity-sensor"));

        let state = Arc::new(Mutex::new(ControlState {
            presentation: PresentationState::default(),
            fan: FanSpeed::Auto,
        }));

        let inbound = InboundTask {
            name: name.clone(),
            axis,
            registry: registry.clone(),
            handle,
            state: state.clone(),
        };
        tokio::spawn(inbound.run(session.subscribe(), session.cancel_token()));

        Arc::new(Self {
            name,
            axis,
            session,
            registry,
            handle,
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }

    /// Snapshot of the current presentation, mainly for tests and the host.
    pub fn presentation(&self) -> PresentationState {
        self.state.lock().unwrap().presentation.clone()
    }

    // -- Control-set operations --

    pub async fn set_active(&self, active: bool) -> Result<()> {
        debug!(device = %self.name, active, "set active");
        self.ensure_connected()?;

        if !active {
            return self.session.send(translate::mode_fragment(TargetMode::Off)).await;
        }

        // Two-step activation: wait briefly, then re-issue the last known
        // mode only if the device still reports itself inactive.
        tokio::time::sleep(ACTIVATE_DELAY).await;
        let (operating, target) = {
            let state = self.state.lock().unwrap();
            (state.presentation.operating, state.presentation.target)
        };
        if operating == OperatingState::Inactive {
            self.set_target_mode(target).await
        } else {
            Ok(())
        }
    }

    pub async fn set_target_mode(&self, mode: TargetMode) -> Result<()> {
        info!(device = %self.name, mode = mode.as_device_str(), "set target mode");
        self.ensure_connected()?;
        self.session.send(translate::mode_fragment(mode)).await
    }

    /// Threshold-temperature edit via either threshold control.
    ///
    /// Cooling-threshold edits while the last known mode is auto are
    /// accepted but send nothing; auto mode is governed through the heating
    /// threshold only.
    pub async fn set_threshold(&self, slot: ThresholdSlot, temperature: f64) -> Result<()> {
        let target = self.state.lock().unwrap().presentation.target;
        let Some(fragment) = translate::threshold_fragment(slot, target, temperature) else {
            return Ok(());
        };

        info!(device = %self.name, ?slot, temperature, "set threshold temperature");
        self.ensure_connected()?;
        self.session.send(fragment).await
    }

    pub async fn set_rotation_speed(&self, percent: f64) -> Result<()> {
        info!(device = %self.name, percent, "set rotation speed");
        self.ensure_connected()?;

        let fan = self.state.lock().unwrap().fan;
        match translate::fan_fragment(fan, percent) {
            Some(fragment) => self.session.send(fragment).await,
            None => Ok(()),
        }
    }

    pub async fn set_swing(&self, enabled: bool) -> Result<()> {
        info!(device = %self.name, enabled, "set swing mode");
        self.ensure_connected()?;
        self.session.send(translate::swing_fragment(self.axis, enabled)).await
    }

    pub async fn set_toggle(&self, toggle: Toggle, on: bool) -> Result<()> {
        info!(device = %self.name, toggle = toggle.display_name(), on, "set toggle");
        self.ensure_connected()?;
        self.session.send(translate::toggle_fragment(toggle, on)).await
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.session.is_connected() {
            Ok(())
        } else {
            error!(device = %self.name, "device not connected");
            Err(Error::NotConnected)
        }
    }
}

/// Consumes session events and republishes them as characteristic updates.
struct InboundTask {
    name: String,
    axis: SwingAxis,
    registry: Arc<dyn Registry>,
    handle: AccessoryHandle,
    state: Arc<Mutex<ControlState>>,
}

impl InboundTask {
    async fn run(
        self,
        mut events: broadcast::Receiver<SessionEvent>,
        cancel: tokio_util::sync::CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(SessionEvent::Document(document)) => self.apply_document(document),
                    Ok(SessionEvent::Status(status)) => {
                        debug!(device = %self.name, ?status, "connection status changed");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Only the latest document matters; skipped ones were
                        // already superseded.
                        warn!(device = %self.name, skipped, "lagged behind session events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!(device = %self.name, "inbound task exiting");
    }

    fn apply_document(&self, document: serde_json::Value) {
        let parsed: DeviceState = match serde_json::from_value(document) {
            Ok(state) => state,
            Err(e) => {
                warn!(device = %self.name, "ignoring malformed state document: {e}");
                return;
            }
        };

        let presentation = {
            let mut state = self.state.lock().unwrap();
            state.fan = parsed.target_fan_speed;
            state.presentation.apply(&parsed, self.axis);
            state.presentation.clone()
        };
        self.publish(&presentation);
    }

    fn publish(&self, p: &PresentationState) {
        let hc = service::HEATER_COOLER;
        let active = if p.active { value::ACTIVE } else { value::INACTIVE };
        self.registry
            .update(self.handle, hc, characteristic::ACTIVE, json!(active));

        let operating = match p.operating {
            OperatingState::Inactive => value::CURRENT_INACTIVE,
            OperatingState::Heating => value::CURRENT_HEATING,
            OperatingState::Cooling => value::CURRENT_COOLING,
        };
        self.registry
            .update(self.handle, hc, characteristic::CURRENT_STATE, json!(operating));

        if p.active
            && let Some(target) = target_state_value(p.target)
        {
            self.registry
                .update(self.handle, hc, characteristic::TARGET_STATE, json!(target));
        }

        self.registry.update(
            self.handle,
            hc,
            characteristic::HEATING_THRESHOLD,
            json!(p.heating_threshold),
        );
        self.registry.update(
            self.handle,
            hc,
            characteristic::COOLING_THRESHOLD,
            json!(p.cooling_threshold),
        );
        self.registry.update(
            self.handle,
            hc,
            characteristic::CURRENT_TEMPERATURE,
            json!(p.current_temperature),
        );
        self.registry.update(
            self.handle,
            hc,
            characteristic::ROTATION_SPEED,
            json!(p.rotation_speed),
        );

        let swing = if p.swing_enabled {
            value::SWING_ENABLED
        } else {
            value::SWING_DISABLED
        };
        self.registry
            .update(self.handle, hc, characteristic::SWING_MODE, json!(swing));

        for toggle in Toggle::ALL {
            let on = match toggle {
                Toggle::VerticalSwing => p.vertical_swing,
                Toggle::HorizontalSwing => p.horizontal_swing,
                Toggle::QuietMode => p.quiet_mode,
                Toggle::PowerfulMode => p.powerful_mode,
            };
            self.registry.update(
                self.handle,
                toggle.display_name(),
                characteristic::ON,
                json!(on),
            );
        }

        self.registry.update(
            self.handle,
            "Humidity",
            characteristic::CURRENT_HUMIDITY,
            json!(p.humidity),
        );
    }
}

fn target_state_value(mode: TargetMode) -> Option<u8> {
    match mode {
        TargetMode::Auto => Some(value::TARGET_AUTO),
        TargetMode::Heat => Some(value::TARGET_HEAT),
        TargetMode::Cool => Some(value::TARGET_COOL),
        TargetMode::Off => None,
    }
}
