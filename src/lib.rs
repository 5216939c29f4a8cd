//! HablaConmigo Core Library
//!
//! Turn-taking engine for a spoken Spanish tutor: speech capture and output
//! components, the conversation state machine, reply sources, and telemetry.

pub mod orchestrator;
pub mod responder;
pub mod session;
pub mod speech;
pub mod telemetry;

pub use orchestrator::{TurnOrchestrator, TutorConfig};
pub use session::{SessionStreams, TutorSession};
