//! Builders to construct an engine from configuration.

pub mod engine_builder;

pub use engine_builder::EngineBuilder;
