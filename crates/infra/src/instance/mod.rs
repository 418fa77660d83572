//! Single-instance lock and second-launch forwarding

pub mod coordinator;
pub mod lock;

pub use coordinator::{InstanceRole, PrimaryInstance, SecondInstanceMessage, SingleInstanceCoordinator};
pub use lock::{InstanceLock, LockRecord};
