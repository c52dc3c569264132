pub mod runner;
mod target;

pub use runner::{Driver, Error, Plan, Result, RunSettings, Scope};
pub use target::{HttpTarget, Target, TargetError, TargetResponse};
