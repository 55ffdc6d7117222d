//! Delay-stage scans: position plan, result table and the control loop.

pub mod plan;
pub mod runner;
pub mod table;

pub use plan::ScanPlan;
pub use runner::{DelayScan, ScanEvent, ScanOutcome, ScanParameters};
pub use table::ScanTable;
