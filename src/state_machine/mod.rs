// State machine module for the build job lifecycle
//
// Pure decision functions over the job status vocabulary plus a single
// apply-transition function that every status change in the crate goes through.

pub mod errors;
pub mod states;
pub mod transitions;

// Re-export main types for convenient access
pub use errors::StateMachineError;
pub use states::BuildStatus;
pub use transitions::{can_transition, is_terminal_state, transition_job};
