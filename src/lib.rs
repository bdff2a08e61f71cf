//! crash - declarative test plan runner
//!
//! A Crashfile declares plans made of steps. Steps run actions (`http`,
//! `shell`) or group other steps serially or in parallel, optionally looped
//! with `with` and bounded by a timeout. Each step's results become variables
//! that one-line check scripts such as `status-code eq 200` verify.

pub mod action;
pub mod cli;
pub mod commands;
pub mod common;
pub mod runtime;
pub mod script;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use runtime::{Engine, Scope};
pub use script::{Script, Value};
