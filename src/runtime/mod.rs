//! Plan compilation and execution

pub mod engine;
pub mod plan;
pub mod report;
pub mod variables;

pub use engine::Engine;
pub use plan::{compile, parse_timeout, Plan, Step, StepBody, TestPlan};
pub use report::{EventKind, HumanReporter, JsonReporter, Level, RecordingReporter, Reporter};
pub use variables::Scope;
