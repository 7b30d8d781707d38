//! # Shared Line Appearance
//!
//! Call-admission and state-coordination engine for key-system style
//! telephony, where a handful of outside lines ("trunks") are shared by many
//! user-facing lines ("stations").
//!
//! At most one call occupies a trunk at a time. Any station configured on a
//! trunk sees its state on a line key, may barge into the call, put it on
//! hold, or pick up a call another station parked, subject to per-trunk and
//! per-station access policy. The engine decides on every ring, answer,
//! hangup, hold and timeout which station rings, which trunk an answering
//! station gets, and when a delayed or timed-out ring has to stop.
//!
//! ## What the engine does not do
//!
//! Audio never passes through this crate. Call legs, outbound dials,
//! conference bridging, lamp publication and dialplan registration are all
//! external services described by the traits in [`core::collaborator`].
//! [`infra::memory`] has in-process implementations used for development
//! and by the test suite.
//!
//! ## Key Features
//!
//! - **Inbound ringing**: stations ring in priority order with per-pair and
//!   per-station ring delays and ring timeouts
//! - **Answer races**: a ringing trunk is claimed atomically, so two stations
//!   answering at once end with exactly one of them connected
//! - **Hold**: open or private hold with retrieval from any permitted station
//! - **Outbound seizure**: a station going off-hook on an idle trunk dials
//!   out on it and hears progress while the far end rings
//! - **Live reload**: mark-and-sweep reconciliation that never disturbs a
//!   call in progress
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shared_line_appearance::builders::EngineBuilder;
//! use shared_line_appearance::config::SlaConfig;
//! use shared_line_appearance::infra::memory::MemoryServices;
//!
//! let services = MemoryServices::new();
//! let engine = EngineBuilder::new(services.collaborators())
//!     .with_config(SlaConfig::from_json_file("sla.json")?)
//!     .build()?;
//!
//! // One call per real call leg, each on its own thread:
//! let status = engine.trunk_exec(&inbound_leg, "line1")?;
//! let status = engine.station_exec(&handset_leg, "s1_line1");
//!
//! engine.shutdown();
//! ```
//!
//! For complete scenarios, see the integration tests under `tests/`.

/// Trunk/station graph, ringing bookkeeping and the call-admission engine.
pub mod core;
/// Configuration models for trunks, stations and engine-wide options.
pub mod config;
/// Builders to construct an engine from configuration.
pub mod builders;
/// In-process implementations of the external services.
pub mod infra;
/// Thread spawning and the introspection API.
pub mod runtime;
/// Shared utilities.
pub mod util;
