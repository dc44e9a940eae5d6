//! Boundary with the external speech-to-text helper process.

pub mod env;
pub mod launcher;
pub mod outcome;

pub use env::HelperEnv;
pub use launcher::{HelperHandle, HelperLauncher, ProcessLauncher};
pub use outcome::{OutcomeKind, Termination, interpret};
