#![forbid(unsafe_code)]

pub mod common;
pub mod ph1c;
pub mod ph1e;
pub mod ph1n;
pub mod ph1sched;
pub mod ph1x;

pub use common::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};
