//! Time sources
//!
//! Expiry checks (pending login timeout, token lifetime) read the current
//! time through [`Clock`] so tests can move time without sleeping.

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
