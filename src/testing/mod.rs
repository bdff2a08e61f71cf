//! Crashfile loading and running
//!
//! `config` is the serde model of a Crashfile; `runner` wires it to the
//! step compiler, the engine and a reporter.

pub mod config;
mod runner;

pub use config::Crashfile;
pub use runner::{load, operators, parse_var_args, root_scope, run, validate, Loaded, TestOptions};
