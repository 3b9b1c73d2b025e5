//! Boundary to the external accessory host framework.
//!
//! The host owns accessory identities and their control surfaces across
//! restarts; the bridge only talks to it through the [`Registry`] trait.
//! [`MemoryRegistry`] is a self-contained implementation used by the tests
//! and by embedders without a persistent host.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use uuid::Uuid;

/// Fixed namespace for deriving accessory UUIDs from device MAC addresses.
/// Changing this orphans every previously registered accessory.
const DEVICE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x14, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// Stable accessory UUID for a device hardware identifier.
pub fn device_uuid(mac: &str) -> Uuid {
    Uuid::new_v5(&DEVICE_NAMESPACE, mac.as_bytes())
}

/// Control-surface names exposed on an accessory.
pub mod service {
    /// Identity metadata surface present on every accessory.
    pub const INFORMATION: &str = "AccessoryInformation";
    pub const HEATER_COOLER: &str = "HeaterCooler";
    /// Pre-rework single-thermostat surface, removed by migration.
    pub const THERMOSTAT: &str = "Thermostat";
}

/// Characteristic names within a control surface.
pub mod characteristic {
    pub const MANUFACTURER: &str = "Manufacturer";
    pub const MODEL: &str = "Model";
    pub const SERIAL_NUMBER: &str = "SerialNumber";
    pub const ACTIVE: &str = "Active";
    pub const CURRENT_STATE: &str = "CurrentHeaterCoolerState";
    pub const TARGET_STATE: &str = "TargetHeaterCoolerState";
    pub const CURRENT_TEMPERATURE: &str = "CurrentTemperature";
    pub const HEATING_THRESHOLD: &str = "HeatingThresholdTemperature";
    pub const COOLING_THRESHOLD: &str = "CoolingThresholdTemperature";
    pub const ROTATION_SPEED: &str = "RotationSpeed";
    pub const SWING_MODE: &str = "SwingMode";
    pub const ON: &str = "On";
    pub const CURRENT_HUMIDITY: &str = "CurrentRelativeHumidity";
}

/// Numeric characteristic values, matching the host framework's constants.
pub mod value {
    pub const INACTIVE: u8 = 0;
    pub const ACTIVE: u8 = 1;

    pub const CURRENT_INACTIVE: u8 = 0;
    pub const CURRENT_HEATING: u8 = 2;
    pub const CURRENT_COOLING: u8 = 3;

    pub const TARGET_AUTO: u8 = 0;
    pub const TARGET_HEAT: u8 = 1;
    pub const TARGET_COOL: u8 = 2;

    pub const SWING_DISABLED: u8 = 0;
    pub const SWING_ENABLED: u8 = 1;
}

/// Opaque handle to a registered accessory. Stable across re-discovery;
/// only [`Registry::unregister`] invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessoryHandle(pub u64);

pub trait Registry: Send + Sync + 'static {
    /// Handle of a previously registered accessory, if the host still has it.
    fn find(&self, uuid: Uuid) -> Option<AccessoryHandle>;

    fn register(&self, uuid: Uuid, display_name: &str) -> AccessoryHandle;

    fn unregister(&self, handle: AccessoryHandle);

    /// Attach the named control surface if it is not already present.
    fn ensure_service(&self, handle: AccessoryHandle, name: &str, subtype: Option<&str>);

    fn has_service(&self, handle: AccessoryHandle, name: &str) -> bool;

    fn remove_service(&self, handle: AccessoryHandle, name: &str);

    /// Names of subtyped (non-primary) services, for the legacy purge.
    fn subtyped_services(&self, handle: AccessoryHandle) -> Vec<String>;

    fn update(&self, handle: AccessoryHandle, service: &str, characteristic: &str, value: Value);
}

#[derive(Debug, Default)]
struct AccessoryRecord {
    uuid: Uuid,
    display_name: String,
    /// service name -> (subtype, characteristic -> value)
    services: HashMap<String, (Option<String>, HashMap<String, Value>)>,
}

/// In-memory registry: no persistence, same visible contract as a real host.
#[derive(Default)]
pub struct MemoryRegistry {
    next_id: AtomicU64,
    accessories: Mutex<HashMap<AccessoryHandle, AccessoryRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load a cached accessory, as a persistent host would at startup.
    pub fn seed(&self, uuid: Uuid, display_name: &str) -> AccessoryHandle {
        self.register(uuid, display_name)
    }

    pub fn contains(&self, handle: AccessoryHandle) -> bool {
        self.accessories.lock().unwrap().contains_key(&handle)
    }

    pub fn display_name(&self, handle: AccessoryHandle) -> Option<String> {
        self.accessories
            .lock()
            .unwrap()
            .get(&handle)
            .map(|a| a.display_name.clone())
    }

    /// Last value written to a characteristic, if any.
    pub fn characteristic(
        &self,
        handle: AccessoryHandle,
        service: &str,
        characteristic: &str,
    ) -> Option<Value> {
        self.accessories
            .lock()
            .unwrap()
            .get(&handle)
            .and_then(|a| a.services.get(service))
            .and_then(|(_, values)| values.get(characteristic))
            .cloned()
    }
}

impl Registry for MemoryRegistry {
    fn find(&self, uuid: Uuid) -> Option<AccessoryHandle> {
        self.accessories
            .lock()
            .unwrap()
            .iter()
            .find(|(_, record)| record.uuid == uuid)
            .map(|(handle, _)| *handle)
    }

    fn register(&self, uuid: Uuid, display_name: &str) -> AccessoryHandle {
        let handle = AccessoryHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.accessories.lock().unwrap().insert(
            handle,
            AccessoryRecord {
                uuid,
                display_name: display_name.to_string(),
                services: HashMap::new(),
            },
        );
        handle
    }

    fn unregister(&self, handle: AccessoryHandle) {
        self.accessories.lock().unwrap().remove(&handle);
    }

    fn ensure_service(&self, handle: AccessoryHandle, name: &str, subtype: Option<&str>) {
        if let Some(record) = self.accessories.lock().unwrap().get_mut(&handle) {
            record
                .services
                .entry(name.to_string())
                .or_insert_with(|| (subtype.map(str::to_string), HashMap::new()));
        }
    }

    fn has_service(&self, handle: AccessoryHandle, name: &str) -> bool {
        self.accessories
            .lock()
            .unwrap()
            .get(&handle)
            .is_some_and(|record| record.services.contains_key(name))
    }

    fn remove_service(&self, handle: AccessoryHandle, name: &str) {
        if let Some(record) = self.accessories.lock().unwrap().get_mut(&handle) {
            record.services.remove(name);
        }
    }

    fn subtyped_services(&self, handle: AccessoryHandle) -> Vec<String> {
        self.accessories
            .lock()
            .unwrap()
            .get(&handle)
            .map(|record| {
                record
                    .services
                    .iter()
                    .filter(|(_, (subtype, _))| subtype.is_some())
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn update(&self, handle: AccessoryHandle, service: &str, characteristic: &str, value: Value) {
        if let Some(record) = self.accessories.lock().unwrap().get_mut(&handle) {
            let (_, values) = record
                .services
                .entry(service.to_string())
                .or_insert_with(|| (None, HashMap::new()));
            values.insert(characteristic.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_uuid_is_stable() {
        let a = device_uuid("aa:bb:cc:dd:ee:ff");
        let b = device_uuid("aa:bb:cc:dd:ee:ff");
        let c = device_uuid("aa:bb:cc:dd:ee:00");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn register_find_unregister() {
        let registry = MemoryRegistry::new();
        let uuid = device_uuid("aa:bb:cc:dd:ee:ff");
        assert!(registry.find(uuid).is_none());

        let handle = registry.register(uuid, "aabbccddeeff");
        assert_eq!(registry.find(uuid), Some(handle));

        registry.unregister(handle);
        assert!(registry.find(uuid).is_none());
    }

    #[test]
    fn ensure_service_is_idempotent() {
        let registry = MemoryRegistry::new();
        let handle = registry.register(device_uuid("aa:bb:cc:dd:ee:ff"), "ac");
        registry.ensure_service(handle, service::HEATER_COOLER, None);
        registry.update(
            handle,
            service::HEATER_COOLER,
            characteristic::ACTIVE,
            json!(1),
        );
        registry.ensure_service(handle, service::HEATER_COOLER, None);
        assert_eq!(
            registry.characteristic(handle, service::HEATER_COOLER, characteristic::ACTIVE),
            Some(json!(1))
        );
    }

    #[test]
    fn subtyped_services_listed_for_purge() {
        let registry = MemoryRegistry::new();
        let handle = registry.register(device_uuid("aa:bb:cc:dd:ee:ff"), "ac");
        registry.ensure_service(handle, service::THERMOSTAT, None);
        registry.ensure_service(handle, "Quiet Mode", Some("quietMode"));
        registry.ensure_service(handle, "Humidity", Some("humidity-sensor"));

        let mut subtyped = registry.subtyped_services(handle);
        subtyped.sort();
        assert_eq!(subtyped, vec!["Humidity", "Quiet Mode"]);
    }
}
