use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use env_logger::{Builder, Target};
use log::LevelFilter;

/// Mirrors every log record to stdout and an append-mode log file, so a
/// build wrapped by graft can collect wrapper logs across the many driver
/// processes the build system spawns.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

/// Initializes logging for one driver invocation.
///
/// `--graft-verbose` raises the level to debug; `GRAFT_LOG_FILE` tees
/// records into a shared log file. `RUST_LOG` still wins when set.
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();

    match std::env::var("GRAFT_LOG_FILE") {
        Ok(path) => match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(Tee { file })));
            }
            Err(err) => {
                eprintln!("graft: cannot open log file {path}: {err}");
                builder.target(Target::Stdout);
            }
        },
        Err(_) => {
            builder.target(Target::Stdout);
        }
    }

    // A second init in the same process (tests) is harmless.
    let _ = builder.try_init();
}
