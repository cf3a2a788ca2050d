use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use graft_args::Argv;
use miette::Diagnostic;
use thiserror::Error;

/// Failure modes of a child process invocation.
///
/// A launch failure and a non-zero exit are kept apart: the latter carries
/// the child's combined output and exit code so the caller can surface both
/// instead of substituting a generic failure.
#[derive(Debug, Error, Diagnostic)]
pub enum ProcessError {
    #[error("failed to launch {binary}: {message}")]
    #[diagnostic(code(graft::process::launch))]
    Launch { binary: String, message: String },

    #[error("{binary} exited with code {code}:\n{output}")]
    #[diagnostic(code(graft::process::exit))]
    Exited {
        binary: String,
        code: i32,
        output: String,
    },
}

impl ProcessError {
    /// The exit code to mirror to the surrounding build system.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessError::Launch { .. } => 1,
            ProcessError::Exited { code, .. } => *code,
        }
    }

    /// The child's combined output, if it got far enough to produce any.
    pub fn output(&self) -> &str {
        match self {
            ProcessError::Launch { .. } => "",
            ProcessError::Exited { output, .. } => output,
        }
    }
}

/// A successfully completed child process.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Combined stdout + stderr.
    pub output: String,
}

/// Seam for invoking external binaries.
///
/// The orchestrator only talks to toolchain and optimizer binaries through
/// this trait, so tests can substitute a recording fake and assert which
/// invocations happened without running anything.
pub trait Runner {
    fn run(
        &self,
        binary: &Path,
        argv: &Argv,
        env: &BTreeMap<String, String>,
    ) -> Result<Invocation, ProcessError>;
}

/// Runs real processes, synchronously and without timeout.
///
/// The env overlay is applied to the child command only; the parent
/// environment is never mutated.
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(
        &self,
        binary: &Path,
        argv: &Argv,
        env: &BTreeMap<String, String>,
    ) -> Result<Invocation, ProcessError> {
        let mut cmd = Command::new(binary);
        cmd.args(argv.iter());
        cmd.envs(env);

        let out = cmd.output().map_err(|err| ProcessError::Launch {
            binary: binary.display().to_string(),
            message: err.to_string(),
        })?;

        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&out.stderr));

        if !out.status.success() {
            return Err(ProcessError::Exited {
                binary: binary.display().to_string(),
                code: out.status.code().unwrap_or(1),
                output: combined,
            });
        }
        Ok(Invocation { output: combined })
    }
}
