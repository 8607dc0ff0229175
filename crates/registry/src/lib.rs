//! Run controller: per-run browser ownership and cooperative pause/cancel
//! flags, plus the run status board used for dual-source cancellation.

pub mod errors;
pub mod metrics;
pub mod state;
pub mod status;

pub use errors::RegistryError;
pub use state::{PauseOutcome, RunRegistration, RunRegistry, RunSlot, RunStateSnapshot};
pub use status::{RunStatusBoard, RunStatusSource};
