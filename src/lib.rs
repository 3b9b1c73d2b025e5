mod accessory;
mod config;
mod debounce;
mod discovery;
mod error;
mod logger;
mod registry;
mod session;
mod state;
mod translate;

pub use accessory::HeaterCooler;
pub use config::{PlatformConfig, StaticDevice};
pub use debounce::{ChangeAggregator, PollPause, StatePoller};
pub use discovery::{
    DiscoveryManager, DiscoverySource, ServiceEvent, TxtRecord, DEVICE_KIND, SERVICE_TYPE,
};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use registry::{
    characteristic, device_uuid, service, value, AccessoryHandle, MemoryRegistry, Registry,
};
pub use session::{
    AddressSource, ConnectionStatus, DeviceSession, DeviceSessionBuilder, SessionEvent,
};
pub use state::{DeviceState, FanSpeed, OperatingState, PresentationState, SwingAxis, TargetMode};
pub use translate::{ThresholdSlot, Toggle};
