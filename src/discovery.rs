//! Service discovery and accessory identity reconciliation.
//!
//! Consumes "service appeared" events from a black-box discovery source,
//! decides create vs. reuse vs. retire for each advertised device, and owns
//! the identity registry mapping stable UUIDs to live sessions. Events are
//! processed strictly one at a time, so the maps need no further locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::lookup_host;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::accessory::HeaterCooler;
use crate::config::{PlatformConfig, StaticDevice};
use crate::registry::{device_uuid, service, AccessoryHandle, Registry};
use crate::session::{AddressSource, DeviceSession, DeviceSessionBuilder};
use crate::state::SwingAxis;
use crate::{Error, Result};

/// Advertisement tag identifying services worth looking at.
pub const SERVICE_TYPE: &str = "oznu-platform";
/// TXT-record `type` sentinel for this device class.
pub const DEVICE_KIND: &str = "daikin-thermostat";

/// One-off rescan shortly after startup, catching advertisements missed
/// during process boot.
pub const STARTUP_RESCAN_DELAY: Duration = Duration::from_secs(5);
/// Steady-state rescan interval, detecting address changes.
pub const RESCAN_INTERVAL: Duration = Duration::from_secs(60);
/// Cached accessories not re-confirmed within this window (from manager
/// start) are unregistered. Single-shot, not a sliding window.
pub const RETIREMENT_WINDOW: Duration = Duration::from_secs(90);

/// Vendor TXT record attached to an advertisement.
#[derive(Debug, Clone, Default)]
pub struct TxtRecord {
    /// Device-class sentinel; must equal [`DEVICE_KIND`].
    pub kind: Option<String>,
    /// Hardware identifier, colon-separated hex.
    pub mac: Option<String>,
}

/// A "service appeared" event from the discovery source.
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub service_type: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub txt: TxtRecord,
}

/// Black-box advertisement source. `rescan` asks it to re-query the network;
/// results arrive as further [`ServiceEvent`]s.
pub trait DiscoverySource: Send + 'static {
    fn rescan(&mut self);
}

struct DeviceEntry {
    handle: AccessoryHandle,
    controller: Arc<HeaterCooler>,
}

pub struct DiscoveryManager {
    registry: Arc<dyn Registry>,
    axis: SwingAxis,
    /// Live devices, exactly one session each.
    active: HashMap<Uuid, DeviceEntry>,
    /// Accessories restored from the host's cache, awaiting confirmation.
    cached: HashMap<Uuid, AccessoryHandle>,
    swept: bool,
}

impl DiscoveryManager {
    pub fn new(config: &PlatformConfig, registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            axis: config.oscillate_direction,
            active: HashMap::new(),
            cached: HashMap::new(),
            swept: false,
        }
    }

    /// Called once per accessory the host restored from its cache, before
    /// the event loop starts.
    pub fn configure_cached(&mut self, uuid: Uuid, handle: AccessoryHandle) {
        self.cached.insert(uuid, handle);
    }

    pub fn is_known(&self, uuid: Uuid) -> bool {
        self.active.contains_key(&uuid)
    }

    pub fn handle_for(&self, uuid: Uuid) -> Option<AccessoryHandle> {
        self.active.get(&uuid).map(|entry| entry.handle)
    }

    pub fn controller(&self, uuid: Uuid) -> Option<Arc<HeaterCooler>> {
        self.active.get(&uuid).map(|entry| entry.controller.clone())
    }

    /// Seed sessions for statically configured devices. These are treated as
    /// confirmed-present and never retired.
    pub fn seed_static(&mut self, devices: &[StaticDevice]) {
        for device in devices {
            let serial = format!("{}:{}", device.host, device.port);
            let uuid = device_uuid(&serial);
            let handle = match self.cached.get(&uuid) {
                Some(handle) => *handle,
                None => self.registry.register(uuid, &device.name),
            };
            self.migrate_legacy(handle);
            info!(host = %device.host, port = device.port, "starting static device");
            let controller =
                self.start_controller(&device.name, &serial, handle, &device.host, device.port);
            self.active.insert(uuid, DeviceEntry { handle, controller });
        }
    }

    /// Reconcile one discovery event: create, reuse, or ignore.
    pub async fn handle_service_up(&mut self, event: ServiceEvent) {
        if event.service_type != SERVICE_TYPE {
            return;
        }
        if event.txt.kind.as_deref() != Some(DEVICE_KIND) {
            return;
        }
        let Some(mac) = event.txt.mac.clone() else {
            return;
        };

        // Validate reachability up front; the session re-resolves on every
        // connect attempt anyway.
        if let Err(e) = resolve_ws_address(&event.host, event.port).await {
            warn!(host = %event.host, "discovery resolution failed: {e}");
            return;
        }

        let uuid = device_uuid(&mac);

        if let Some(entry) = self.active.remove(&uuid) {
            // Reappearance of a live device, possibly at a new address.
            // Replace the session, keep the accessory handle.
            info!(
                "found existing thermostat at {}:{} [{mac}]",
                event.host, event.port
            );
            entry.controller.session().shutdown();
            let controller =
                self.start_controller(&event.name, &mac, entry.handle, &event.host, event.port);
            self.active.insert(
                uuid,
                DeviceEntry {
                    handle: entry.handle,
                    controller,
                },
            );
        } else if let Some(handle) = self.cached.get(&uuid).copied() {
            // Known accessory coming back after a restart.
            info!(
                "found existing thermostat at {}:{} [{mac}]",
                event.host, event.port
            );
            self.migrate_legacy(handle);
            let controller =
                self.start_controller(&event.name, &mac, handle, &event.host, event.port);
            self.active.insert(uuid, DeviceEntry { handle, controller });
        } else {
            info!(
                "found new thermostat at {}:{} [{mac}]",
                event.host, event.port
            );
            let handle = self.registry.register(uuid, &mac.replace(':', ""));
            let controller =
                self.start_controller(&event.name, &mac, handle, &event.host, event.port);
            self.active.insert(uuid, DeviceEntry { handle, controller });
        }
    }

    /// One-time sweep: unregister cached accessories never confirmed by
    /// discovery. A device that vanishes after the sweep is retained until
    /// the next process start.
    pub fn retire_absent(&mut self) {
        if self.swept {
            return;
        }
        self.swept = true;

        let stale: Vec<(Uuid, AccessoryHandle)> = self
            .cached
            .iter()
            .filter(|(uuid, _)| !self.active.contains_key(uuid))
            .map(|(uuid, handle)| (*uuid, *handle))
            .collect();

        for (uuid, handle) in stale {
            info!(%uuid, "retiring accessory not seen on the network");
            self.registry.unregister(handle);
            self.cached.remove(&uuid);
        }
    }

    /// Drive the manager: consume events, trigger rescans, run the
    /// retirement sweep. Returns when cancelled or the event source closes.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ServiceEvent>,
        mut source: impl DiscoverySource,
        cancel: CancellationToken,
    ) {
        let startup_rescan = tokio::time::sleep(STARTUP_RESCAN_DELAY);
        tokio::pin!(startup_rescan);
        let mut startup_done = false;

        let retirement = tokio::time::sleep(RETIREMENT_WINDOW);
        tokio::pin!(retirement);

        let mut rescan =
            tokio::time::interval_at(tokio::time::Instant::now() + RESCAN_INTERVAL, RESCAN_INTERVAL);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_service_up(event).await,
                    None => break,
                },
                _ = &mut startup_rescan, if !startup_done => {
                    startup_done = true;
                    debug!("startup rescan");
                    source.rescan();
                }
                _ = &mut retirement, if !self.swept => self.retire_absent(),
                _ = rescan.tick() => {
                    debug!("periodic rescan");
                    source.rescan();
                }
            }
        }

        for entry in self.active.values() {
            entry.controller.session().shutdown();
        }
        debug!("discovery manager exiting");
    }

    /// Remove the pre-rework single-thermostat surface and its orphaned
    /// sub-controls. Idempotent, keyed on presence of the legacy surface.
    fn migrate_legacy(&self, handle: AccessoryHandle) {
        if !self.registry.has_service(handle, service::THERMOSTAT) {
            return;
        }
        warn!("removing legacy thermostat service");
        self.registry.remove_service(handle, service::THERMOSTAT);
        for name in self.registry.subtyped_services(handle) {
            warn!("removing legacy service: {name}");
            self.registry.remove_service(handle, &name);
        }
    }

    fn start_controller(
        &self,
        name: &str,
        serial: &str,
        handle: AccessoryHandle,
        host: &str,
        port: u16,
    ) -> Arc<HeaterCooler> {
        let session: Arc<DeviceSession> =
            Arc::new(DeviceSessionBuilder::new(name, resolver(host.to_string(), port)).spawn());
        HeaterCooler::start(name, serial, self.axis, session, self.registry.clone(), handle)
    }
}

/// Address source re-resolving the advertised hostname before each attempt.
fn resolver(host: String, port: u16) -> AddressSource {
    Arc::new(move || {
        let host = host.clone();
        Box::pin(async move { resolve_ws_address(&host, port).await })
    })
}

/// Resolve a hostname to a connectable `ws://` address, preferring IPv4.
async fn resolve_ws_address(host: &str, port: u16) -> Result<String> {
    let addrs: Vec<_> = lookup_host((host, port))
        .await
        .map_err(|_| Error::Resolve(host.to_string()))?
        .collect();
    let addr = addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .ok_or_else(|| Error::Resolve(host.to_string()))?;
    Ok(format!("ws://{addr}"))
}
