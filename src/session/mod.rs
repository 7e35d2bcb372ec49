//! Voice session management.
//!
//! One session per joined room: it owns the transport connection, creates
//! and destroys per-speaker pipelines as participants start and stop
//! talking, and tears everything down on leave or connection loss.

pub mod controller;
pub mod pipeline;
pub(crate) mod room;

pub use controller::SessionController;
pub use pipeline::{PipelineState, Utterance, UtteranceBuffer};
