//! Workspace root crate.
//!
//! Re-exports the controller, the plant simulation and the telemetry writers
//! so integration tests can depend on a single crate.

pub use controller::*;
pub use sim::*;
pub use telemetry::*;
