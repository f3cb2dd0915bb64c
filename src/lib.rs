//! Client-side reconciler for the campaign generation stream.
//!
//! A [`SessionController`] owns one [`StreamSession`] per streaming message and
//! applies engine signals to it in arrival order. Every visible change is
//! published through the [`FanoutSynchronizer`] to the live transcript, the
//! persisted history and the inspection panel in a single call.

pub mod config;
pub mod logging;

pub mod core;
pub mod runtime;

pub use crate::core::artifact::{merge, Artifact};
pub use crate::core::blocks::{Block, BlockAssembler, BlockOutcome};
pub use crate::core::channels::{AuxiliaryChannels, ChannelDelta};
pub use crate::core::snapshot::json_data;

pub use crate::runtime::controller::{ControllerError, SessionController, StartedSession};
pub use crate::runtime::fanout::{FanoutSynchronizer, MessageKey, PanelSnapshot};
pub use crate::runtime::session::{
    partial_text, producer_error_text, Applied, SessionOutcome, SessionStatus, StreamSession,
    COMPLETE_TEXT, CONNECTION_ERROR_TEXT, START_TEXT,
};

pub use config::EnvConfig;
pub use logging::init_logging;
