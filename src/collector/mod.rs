pub mod login;
pub mod orchestrator;
pub mod scroll;
pub mod wait;

pub use login::{LoginGate, LoginIndicators, LoginOutcome, LoginState};
pub use orchestrator::{CollectionReport, Orchestrator, RunRequest};
pub use scroll::{Interrogator, ScriptInterrogator, ScrollCollector, ScrollOutcome, StopReason};
pub use wait::{wait_for, WaitOutcome, WaitSpec};
