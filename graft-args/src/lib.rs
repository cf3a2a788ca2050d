#![forbid(unsafe_code)]

mod argv;
mod source;

pub use argv::Argv;
pub use source::{SourceKind, classify_source};
