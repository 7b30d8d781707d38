//! Trunk/station graph, ringing bookkeeping and the call-admission engine.

pub mod collaborator;
pub mod error;
pub mod model;
pub mod registry;
pub mod ringing;
pub mod scheduler;

mod coordinator;
mod dial_worker;
pub mod engine;
pub mod handlers;
pub mod reload;

pub use collaborator::{
    CallerId, Channel, ChannelHandle, Conference, ConferenceProfile, DeviceState, DeviceStateBus,
    Dial, DialHandle, DialResult, Dialer, Dialplan, Extension, ExtensionPriority, FrameWait,
    HoldHook, Indication, StateCallback,
};
pub use engine::{Collaborators, Engine, Job, Spawn, REGISTRAR, STATION_STATUS_VAR, TRUNK_STATUS_VAR};
pub use error::{AppResult, SlaError};
pub use handlers::{StationStatus, TrunkStatus};
pub use model::{
    HoldAccess, Station, StationRef, StationSettings, Trunk, TrunkRef, TrunkSettings, TrunkState,
};
pub use registry::{Named, Registry};
pub use reload::ReloadSummary;
