//! Configuration models for trunks, stations and engine-wide options.

pub mod sla;

pub use sla::{GeneralConfig, SlaConfig, StationConfig, StationTrunkConfig, TrunkConfig};
