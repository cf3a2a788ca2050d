#![forbid(unsafe_code)]

mod logging;
mod toolchain;

use std::path::Path;

use graft_args::{Argv, classify_source};
use graft_core::config::Config;
use graft_core::pipeline;
use graft_core::process::SystemRunner;
use log::debug;
use miette::Report;

const VERBOSE_FLAG: &str = "--graft-verbose";
const DRY_RUN_FLAG: &str = "--graft-dry-run";

fn main() {
    let mut raw = std::env::args();
    let invoked_as = raw
        .next()
        .map(|arg0| {
            Path::new(&arg0)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or(arg0)
        })
        .unwrap_or_else(|| "graft".to_string());
    let argv: Argv = raw.collect();

    if argv.has_flag("--version") {
        println!(
            "graft {} | default clang dir: {}",
            env!("CARGO_PKG_VERSION"),
            toolchain::DEFAULT_CLANG_DIR.unwrap_or("<unset>")
        );
        return;
    }

    let verbose = argv.has_flag(VERBOSE_FLAG);
    let argv = argv.remove_flag(VERBOSE_FLAG, false);
    logging::init(verbose);
    debug!("graft invoked as {invoked_as}: {argv}");

    let code = match run(&invoked_as, argv) {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            1
        }
    };
    std::process::exit(code);
}

fn run(invoked_as: &str, argv: Argv) -> Result<i32, Report> {
    let (argv, config) = Config::extract(&argv)?;

    let dry_run = argv.has_flag(DRY_RUN_FLAG);
    let argv = argv.remove_flag(DRY_RUN_FLAG, false);

    let (source_name, kind) = classify_source(&argv);
    let binary = toolchain::binary_name(invoked_as, kind);
    debug!("translation unit {source_name:?} ({kind:?}): driver binary {binary}");

    let Some(mut config) = config else {
        // No config: graft degrades to a transparent driver shim.
        let driver = toolchain::resolve_default(&binary)?;
        return Ok(pipeline::forward(&driver, &argv, &SystemRunner));
    };
    config.dry_run = dry_run;

    let driver = toolchain::resolve(&config.clang_path, &binary)?;
    match pipeline::classify_and_run(&config, &driver, &argv, &SystemRunner) {
        Ok(code) => Ok(code),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", Report::new(err));
            Ok(code)
        }
    }
}
