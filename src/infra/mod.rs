//! In-process implementations of the external services.

pub mod memory;

pub use memory::{
    MemoryChannel, MemoryConference, MemoryDeviceBus, MemoryDialer, MemoryDialplan, MemoryServices,
};
