//! Interfaces of the external services the engine drives.
//!
//! The engine never mixes audio or places calls itself. Call legs arrive as
//! [`Channel`]s, outbound calls go through a [`Dialer`], bridged audio lives
//! in a [`Conference`], and line-key lamps are fed through a
//! [`DeviceStateBus`]. Development and test implementations of every trait
//! live in [`crate::infra::memory`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::SlaError;

/// Control indications sent towards a call leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Indication {
    /// Audible ringing.
    Ringing,
    /// Call progress.
    Progress,
    /// The far end put the call on hold.
    Hold,
    /// The far end retrieved the call from hold.
    Unhold,
    /// Stop any playing indication.
    Stop,
}

/// Caller identification carried by a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerId {
    /// Display name.
    pub name: Option<String>,
    /// Number.
    pub number: Option<String>,
}

/// Outcome of waiting for media on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameWait {
    /// A frame was read (and discarded).
    Frame,
    /// Nothing arrived before the timeout.
    Timeout,
    /// The channel hung up.
    Hangup,
}

/// One real call leg.
pub trait Channel: Send + Sync {
    /// Channel name, used in logs.
    fn name(&self) -> &str;
    /// Answer and wait for media.
    fn answer(&self);
    /// Answer without waiting for media.
    fn raw_answer(&self);
    /// Send a control indication.
    fn indicate(&self, indication: Indication);
    /// Request a hangup of this leg.
    fn soft_hangup(&self);
    /// Whether this leg has hung up.
    fn is_hung_up(&self) -> bool;
    /// Current caller identification.
    fn caller_id(&self) -> CallerId;
    /// Replace the caller identification.
    fn set_caller_id(&self, caller: CallerId);
    /// Set a channel variable.
    fn set_var(&self, name: &str, value: &str);
    /// Read a channel variable.
    fn var(&self, name: &str) -> Option<String>;
    /// Wait up to `timeout` for the next frame.
    fn wait_for_frame(&self, timeout: Duration) -> FrameWait;
}

/// Shared handle to a call leg.
pub type ChannelHandle = Arc<dyn Channel>;

/// State of an outbound dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialResult {
    /// Invalid dial structure.
    Invalid,
    /// Could not start.
    Failed,
    /// Dial started, nothing heard yet.
    Trying,
    /// Far end is ringing.
    Ringing,
    /// Progress reported.
    Progress,
    /// Proceeding reported.
    Proceeding,
    /// Far end answered.
    Answered,
    /// Dial timed out.
    Timeout,
    /// Far end hung up.
    Hangup,
    /// Nobody answered.
    Unanswered,
}

impl DialResult {
    /// Whether the dial has ended without an answer.
    #[must_use]
    pub const fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            Self::Invalid | Self::Failed | Self::Timeout | Self::Hangup | Self::Unanswered
        )
    }
}

/// Callback fired by a dial whenever its state changes.
pub type StateCallback = Box<dyn Fn() + Send + Sync>;

/// An outbound dial in progress.
pub trait Dial: Send + Sync {
    /// Add a target device (`tech/resource`).
    fn append(&self, tech: &str, resource: &str) -> Result<(), SlaError>;
    /// Register the state-change callback.
    fn set_state_callback(&self, callback: StateCallback);
    /// Start dialing asynchronously on behalf of `requester`.
    fn run(&self, requester: Option<&ChannelHandle>) -> DialResult;
    /// Poll the current state.
    fn state(&self) -> DialResult;
    /// The channel that answered, if any.
    fn answered(&self) -> Option<ChannelHandle>;
    /// Wait for the dial's internal worker to finish.
    fn join(&self);
    /// Release the dial and hang up anything still ringing.
    fn destroy(&self);
}

/// Shared handle to a dial.
pub type DialHandle = Arc<dyn Dial>;

/// Factory for outbound dials.
pub trait Dialer: Send + Sync {
    /// Create a new, empty dial.
    fn create(&self) -> Result<DialHandle, SlaError>;
}

/// Callback a conference fires when a participant signals hold.
pub type HoldHook = Box<dyn Fn() + Send + Sync>;

/// Participant settings for a conference join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceProfile {
    /// No enter/leave sounds.
    pub quiet: bool,
    /// Leave when the last marked participant leaves.
    pub marked_exit: bool,
    /// This participant is marked.
    pub marked_user: bool,
    /// Pass DTMF through.
    pub pass_dtmf: bool,
    /// Music-on-hold class played instead of silence while alone.
    pub music_on_hold: Option<String>,
}

impl ConferenceProfile {
    /// Profile for a station leg.
    #[must_use]
    pub const fn station() -> Self {
        Self {
            quiet: true,
            marked_exit: true,
            marked_user: false,
            pass_dtmf: true,
            music_on_hold: None,
        }
    }

    /// Profile for the outside line of a trunk.
    #[must_use]
    pub const fn trunk() -> Self {
        Self {
            quiet: true,
            marked_exit: true,
            marked_user: true,
            pass_dtmf: true,
            music_on_hold: None,
        }
    }
}

/// External conference (bridging) service.
pub trait Conference: Send + Sync {
    /// Join `chan` to `conference`; blocks until the participant leaves.
    fn join(
        &self,
        chan: &ChannelHandle,
        conference: &str,
        profile: &ConferenceProfile,
        on_hold: Option<HoldHook>,
    ) -> Result<(), SlaError>;
    /// Remove every participant from `conference`.
    fn kick_all(&self, conference: &str, chan: Option<&ChannelHandle>) -> Result<(), SlaError>;
}

/// Device states as seen by line-key lamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    /// Unknown device state.
    Unknown,
    /// Device is idle.
    NotInUse,
    /// Device is ringing.
    Ringing,
    /// Device is in use.
    InUse,
    /// Device is on hold.
    OnHold,
    /// No such device.
    Invalid,
}

/// Publication and lookup of device states.
pub trait DeviceStateBus: Send + Sync {
    /// Publish a state change for `device`.
    fn publish(&self, device: &str, state: DeviceState);
    /// Look up the current state of a physical device.
    fn device_state(&self, device: &str) -> DeviceState;
}

/// Priority slot of a dialplan extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExtensionPriority {
    /// Numbered priority.
    Step(u32),
    /// Hint priority.
    Hint,
}

/// A dialplan extension owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// Extension name.
    pub exten: String,
    /// Priority slot.
    pub priority: ExtensionPriority,
    /// Application name, or the hint device for hints.
    pub app: String,
    /// Application data.
    pub data: Option<String>,
}

/// Dialplan where autocontext extensions are registered.
pub trait Dialplan: Send + Sync {
    /// Add `extension` to `context` (creating the context if needed).
    fn add_extension(&self, context: &str, registrar: &str, extension: Extension)
        -> Result<(), SlaError>;
    /// Remove one extension.
    fn remove_extension(&self, context: &str, exten: &str, priority: ExtensionPriority, registrar: &str);
    /// Remove everything `registrar` added.
    fn remove_registrar(&self, registrar: &str);
}
