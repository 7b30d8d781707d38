//! Thread spawning and the introspection API.

pub mod api;
pub mod thread_spawner;

pub use api::{engine_status, list_stations, list_trunks, EngineStatus, StationSnapshot, TrunkRefSnapshot, TrunkSnapshot};
pub use thread_spawner::ThreadSpawner;
