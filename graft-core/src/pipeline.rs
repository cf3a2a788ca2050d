use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use graft_args::{Argv, classify_source};
use log::{debug, info};
use miette::Diagnostic;
use regex::Regex;
use thiserror::Error;

use crate::config::Config;
use crate::process::{ProcessError, Runner};
use crate::workspace::{Workspace, WorkspaceError};

/// Injected into every rewritten command line so flags that only made sense
/// for the original invocation don't fail the rewritten one.
pub const UNUSED_ARG_SUPPRESSION: &str = "-Wno-unused-command-line-argument";

/// Sanitizer flags are stripped before IR emission so the passes never see
/// sanitizer-instrumented IR. Matches the flag and its comma-separated
/// checker list as one token (`-fsanitize=address,undefined`).
fn sanitizer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("-fsanitize=[a-z,]+").expect("static pattern"))
}

/// Pipeline stages, in execution order. Used to label failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    EmitIr,
    Transform,
    Rebuild,
    DryRunPassthrough,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::EmitIr => "emit-ir",
            Stage::Transform => "transform",
            Stage::Rebuild => "rebuild",
            Stage::DryRunPassthrough => "dry-run passthrough",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("{stage} stage failed: {source}")]
    #[diagnostic(code(graft::pipeline::stage))]
    Stage {
        stage: Stage,
        #[source]
        source: ProcessError,
    },

    #[error("missing -o in the rebuild command line; nowhere to place the object file")]
    #[diagnostic(code(graft::pipeline::missing_output))]
    MissingOutput,
}

impl PipelineError {
    /// Exit code reported to the surrounding build system: the failing
    /// child's own code for stage failures, a fixed internal code otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Stage { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}

/// Stage-1 command line: emit IR instead of an object file.
///
/// Derived fresh from the original invocation. Debug-info flags break the
/// optimizer, embedded-bitcode flags fight with `-emit-llvm` (and Xcode
/// likes to inject `-fembed-bitcode` more than once), and the original
/// output path must give way to the workspace IR path.
pub fn emit_ir_args(original: &Argv, ir_path: &str) -> Argv {
    original
        .remove_flag("-g", false)
        .remove_flag("-gmodules", false)
        .remove_all("-fembed-bitcode", false)
        .remove_flag("-fembed-bitcode-marker", false)
        .remove_flag("-o", true)
        .remove_matching(sanitizer_pattern())
        .add_flag("-emit-llvm", "")
        .add_flag("-o", ir_path)
        .add_flag(UNUSED_ARG_SUPPRESSION, "")
}

/// Stage-2 command line: configured pass list and extra arguments, then the
/// input IR, then the output path.
pub fn optimizer_args(config: &Config, input: &str, output: &str) -> Argv {
    let mut args: Vec<String> = Vec::new();
    if !config.passes.is_empty() {
        args.push(format!("-passes={}", config.passes.join(",")));
    }
    args.extend(config.opt_args.iter().cloned());
    args.push(input.to_string());
    args.push("-o".to_string());
    args.push(output.to_string());
    Argv::from(args)
}

/// Stage-3 command line: compile the transformed IR to the originally
/// requested object file.
///
/// Derived from the original invocation, not the stage-1 vector: the
/// original `-o` must survive so the object lands where the build system
/// expects it.
pub fn rebuild_args(original: &Argv, opt_ir_path: &str) -> Argv {
    original
        .remove_flag("-x", true)
        .add_flag("-x", "ir")
        .remove_flag("-c", true)
        .add_flag("-c", opt_ir_path)
        .add_flag(UNUSED_ARG_SUPPRESSION, "")
}

/// The three-stage rewrite pipeline.
///
/// `EmitIR -> Transform -> Rebuild`, strictly sequential: each stage's input
/// is the previous stage's output file. One pipeline run owns one workspace
/// and corresponds to one translation unit.
pub struct Pipeline<'a, R: Runner> {
    config: &'a Config,
    toolchain: &'a Path,
    runner: &'a R,
}

impl<'a, R: Runner> Pipeline<'a, R> {
    pub fn new(config: &'a Config, toolchain: &'a Path, runner: &'a R) -> Self {
        Pipeline {
            config,
            toolchain,
            runner,
        }
    }

    /// Runs the full pipeline on a compile-to-object invocation.
    ///
    /// In dry-run mode every stage still derives its command line and
    /// creates its workspace file, but the staged invocations are skipped;
    /// one real invocation of the unmodified original command line at the
    /// end still produces a genuine object file.
    pub fn run(&self, original: &Argv) -> Result<(), PipelineError> {
        let workspace = Workspace::create(self.config.retain_workspace)?;

        let (source_name, _) = classify_source(original);
        let base = if source_name.is_empty() {
            "unit".to_string()
        } else {
            source_name
        };

        let ir_path = self.emit_ir(&workspace, &base, original)?;
        let opt_ir_path = self.transform(&workspace, &ir_path)?;
        let object_path = self.rebuild(original, &opt_ir_path)?;

        if self.config.dry_run {
            info!("dry-run: building {base} with the original command line");
            self.runner
                .run(self.toolchain, original, &BTreeMap::new())
                .map_err(|source| PipelineError::Stage {
                    stage: Stage::DryRunPassthrough,
                    source,
                })?;
        }
        info!("pipeline finished for {base}: object at {object_path}");
        Ok(())
    }

    fn emit_ir(
        &self,
        workspace: &Workspace,
        base: &str,
        original: &Argv,
    ) -> Result<String, PipelineError> {
        let ir_path = workspace.create_file(&format!("{base}.bc"))?;
        let argv = emit_ir_args(original, &ir_path);

        info!("emitting IR for {base}");
        debug!("emit-ir command: {} {argv}", self.toolchain.display());
        if self.config.dry_run {
            debug!("dry-run: skipping IR emission");
        } else {
            self.runner
                .run(self.toolchain, &argv, &BTreeMap::new())
                .map_err(|source| PipelineError::Stage {
                    stage: Stage::EmitIr,
                    source,
                })?;
            info!("IR written to {ir_path}");
        }
        Ok(ir_path)
    }

    fn transform(&self, workspace: &Workspace, ir_path: &str) -> Result<String, PipelineError> {
        let stem = Path::new(ir_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unit".to_string());
        let opt_ir_path = workspace.create_file(&format!("{stem}.opt.bc"))?;
        let argv = optimizer_args(self.config, ir_path, &opt_ir_path);

        info!("running optimizer passes on {ir_path}");
        debug!("transform command: {} {argv}", self.config.opt_path);
        if self.config.dry_run {
            debug!("dry-run: skipping optimizer");
        } else {
            self.runner
                .run(
                    Path::new(&self.config.opt_path),
                    &argv,
                    &self.config.opt_env,
                )
                .map_err(|source| PipelineError::Stage {
                    stage: Stage::Transform,
                    source,
                })?;
            info!("transformed IR written to {opt_ir_path}");
        }
        Ok(opt_ir_path)
    }

    fn rebuild(&self, original: &Argv, opt_ir_path: &str) -> Result<String, PipelineError> {
        let argv = rebuild_args(original, opt_ir_path);
        let object_path = argv
            .flag_value("-o")
            .map(str::to_string)
            .ok_or(PipelineError::MissingOutput)?;

        info!("rebuilding {opt_ir_path} into an object file");
        debug!("rebuild command: {} {argv}", self.toolchain.display());
        if self.config.dry_run {
            debug!("dry-run: skipping rebuild");
        } else {
            self.runner
                .run(self.toolchain, &argv, &BTreeMap::new())
                .map_err(|source| PipelineError::Stage {
                    stage: Stage::Rebuild,
                    source,
                })?;
            info!("object written to {object_path}");
        }
        Ok(object_path)
    }
}

/// Forwards an invocation verbatim to the toolchain binary, mirroring its
/// combined output and exit code. Used for everything that is not a
/// compile-to-object step (link lines, preprocessing, version queries).
pub fn forward<R: Runner>(toolchain: &Path, argv: &Argv, runner: &R) -> i32 {
    debug!("forwarding verbatim: {} {argv}", toolchain.display());
    match runner.run(toolchain, argv, &BTreeMap::new()) {
        Ok(invocation) => {
            print!("{}", invocation.output);
            0
        }
        Err(err) => {
            print!("{}", err.output());
            log::error!("forwarded invocation failed: {err}");
            err.exit_code()
        }
    }
}

/// Single entry point: classify the invocation, then either forward it
/// untouched or run the rewrite pipeline.
///
/// Only a command line carrying `-c` is a single-translation-unit compile;
/// anything else never creates a workspace and mirrors the forwarded
/// process's exit code.
pub fn classify_and_run<R: Runner>(
    config: &Config,
    toolchain: &Path,
    argv: &Argv,
    runner: &R,
) -> Result<i32, PipelineError> {
    if !argv.has_flag("-c") {
        debug!("not an object compilation step: forwarding to the driver");
        return Ok(forward(toolchain, argv, runner));
    }
    Pipeline::new(config, toolchain, runner).run(argv)?;
    Ok(0)
}
