// crates/bastion-manager/src/lib.rs
//
// bastion-manager: deploys Bastion modules, runs each one behind its own
// mailbox actor, and batches pause, unpause and fee claims across them.

pub mod actor;
pub mod clock;
pub mod manager;

// Re-export key types for ergonomic access from downstream crates.
pub use actor::{Command, ModuleHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{Manager, ManagerRoles};
