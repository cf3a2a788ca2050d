#![forbid(unsafe_code)]

pub mod config;
pub mod paths;
pub mod pipeline;
pub mod process;
pub mod workspace;

pub use config::{Config, ConfigError};
pub use pipeline::{Pipeline, PipelineError, classify_and_run, forward};
pub use process::{Invocation, ProcessError, Runner, SystemRunner};
