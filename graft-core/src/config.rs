use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use graft_args::Argv;
use log::debug;
use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::paths;

/// Wrapper flag carrying the path to the configuration file.
pub const CONFIG_PATH_FLAG: &str = "--graft-config-path";
/// Wrapper flag that leaks the per-run workspace for inspection.
pub const RETAIN_WORKSPACE_FLAG: &str = "--graft-retain-temp-dir";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    #[diagnostic(code(graft::config::read))]
    Unreadable { path: String, message: String },

    #[error("config file {path} is empty")]
    #[diagnostic(code(graft::config::empty))]
    Empty { path: String },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(code(graft::config::parse))]
    Parse { path: String, message: String },

    #[error("missing or zero seed in config file {path}")]
    #[diagnostic(code(graft::config::seed))]
    MissingSeed { path: String },

    #[error("failed to expand {field} path: {source}")]
    #[diagnostic(code(graft::config::path))]
    BadPath {
        field: &'static str,
        #[source]
        source: paths::PathError,
    },

    #[error("{path} does not look like {expected}: {message}")]
    #[diagnostic(code(graft::config::binary))]
    WrongBinary {
        path: String,
        expected: &'static str,
        message: String,
    },
}

/// Immutable pipeline configuration, parsed from a YAML file.
///
/// Binary paths are expanded and sanity-checked here, before any pipeline
/// work; the pipeline itself never re-validates them.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Seed forwarded to the passes. Opaque to the pipeline, but required:
    /// a config without one is considered malformed.
    #[serde(default)]
    pub seed: i64,

    /// Toolchain binary path, or a directory holding the driver binaries.
    #[serde(rename = "clang")]
    pub clang_path: String,

    /// Optimizer binary path.
    #[serde(rename = "opt")]
    pub opt_path: String,

    /// Pass names, joined into a single `-passes=` argument.
    #[serde(default)]
    pub passes: Vec<String>,

    /// Extra optimizer CLI arguments, appended in order after `-passes=`.
    #[serde(default)]
    pub opt_args: Vec<String>,

    /// Environment overlay for the optimizer process only.
    #[serde(default)]
    pub opt_env: BTreeMap<String, String>,

    /// Compute every stage's command line but skip the staged invocations.
    #[serde(skip)]
    pub dry_run: bool,

    /// Leak the per-run workspace instead of deleting it.
    #[serde(skip)]
    pub retain_workspace: bool,
}

impl Config {
    /// Pulls the wrapper configuration out of a raw driver command line.
    ///
    /// Returns the command line with the wrapper flags stripped, and the
    /// parsed configuration. No `--graft-config-path` means graft was
    /// invoked as a plain driver shim; that is not an error.
    pub fn extract(argv: &Argv) -> Result<(Argv, Option<Config>), ConfigError> {
        let Some(config_path) = argv.flag_value(CONFIG_PATH_FLAG) else {
            debug!("no {CONFIG_PATH_FLAG} flag: running without a config");
            return Ok((argv.clone(), None));
        };
        let config_path = config_path.to_string();
        let mut argv = argv.remove_flag(CONFIG_PATH_FLAG, true);

        let mut config = Config::from_file(&config_path)?;
        if argv.has_flag(RETAIN_WORKSPACE_FLAG) {
            config.retain_workspace = true;
            argv = argv.remove_flag(RETAIN_WORKSPACE_FLAG, false);
        }
        debug!("parsed config from {config_path}: {config:?}");
        Ok((argv, Some(config)))
    }

    /// Reads, parses and validates a configuration file.
    pub fn from_file(path: &str) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Unreadable {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        if content.trim().is_empty() {
            return Err(ConfigError::Empty {
                path: path.to_string(),
            });
        }
        let mut config: Config =
            serde_yaml::from_str(&content).map_err(|err| ConfigError::Parse {
                path: path.to_string(),
                message: err.to_string(),
            })?;
        if config.seed == 0 {
            return Err(ConfigError::MissingSeed {
                path: path.to_string(),
            });
        }

        // Symlinks stay unresolved on purpose: clang++ resolving to clang
        // would silently drop libstdc++ from link lines downstream.
        config.clang_path = paths::expand_path(&config.clang_path, false)
            .map_err(|source| ConfigError::BadPath {
                field: "clang",
                source,
            })?
            .to_string_lossy()
            .into_owned();
        config.opt_path = paths::expand_path(&config.opt_path, false)
            .map_err(|source| ConfigError::BadPath {
                field: "opt",
                source,
            })?
            .to_string_lossy()
            .into_owned();
        verify_opt_binary(Path::new(&config.opt_path))?;

        Ok(config)
    }
}

/// Checks that `path` runs and identifies itself as a clang driver.
pub fn verify_clang_binary(path: &Path) -> Result<(), ConfigError> {
    sniff_version(path, "clang", "a clang driver")
}

/// Checks that `path` runs and identifies itself as an LLVM opt binary.
pub fn verify_opt_binary(path: &Path) -> Result<(), ConfigError> {
    sniff_version(path, "LLVM", "an LLVM opt binary")
}

fn sniff_version(path: &Path, needle: &str, expected: &'static str) -> Result<(), ConfigError> {
    let out = Command::new(path)
        .arg("--version")
        .output()
        .map_err(|err| ConfigError::WrongBinary {
            path: path.display().to_string(),
            expected,
            message: err.to_string(),
        })?;
    let text = String::from_utf8_lossy(&out.stdout);
    if !out.status.success() || !text.contains(needle) {
        return Err(ConfigError::WrongBinary {
            path: path.display().to_string(),
            expected,
            message: format!("`--version` did not mention {needle}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Argv {
        args.iter().copied().collect()
    }

    #[cfg(unix)]
    fn fake_binary(dir: &Path, name: &str, version_line: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\necho \"{version_line}\"\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn extract_without_flag_returns_none() {
        let original = argv(&["-c", "hello.c", "-o", "hello.o"]);
        let (rest, config) = Config::extract(&original).unwrap();
        assert_eq!(rest, original);
        assert!(config.is_none());
    }

    #[test]
    fn unreadable_config_file_is_an_error() {
        let original = argv(&["--graft-config-path", "/nonexistent/graft.yaml", "-c", "a.c"]);
        let err = Config::extract(&original).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn empty_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graft.yaml");
        std::fs::write(&path, "").unwrap();
        let err = Config::from_file(&path.to_string_lossy()).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }

    #[test]
    fn zero_seed_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graft.yaml");
        std::fs::write(&path, "clang: /usr/bin\nopt: /usr/bin/opt\n").unwrap();
        let err = Config::from_file(&path.to_string_lossy()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSeed { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graft.yaml");
        std::fs::write(&path, "seed: [not-an-int\n").unwrap();
        let err = Config::from_file(&path.to_string_lossy()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn parses_a_full_config_and_strips_wrapper_flags() {
        let dir = tempfile::tempdir().unwrap();
        let opt = fake_binary(dir.path(), "opt", "LLVM version 17.0.6");
        let path = dir.path().join("graft.yaml");
        std::fs::write(
            &path,
            format!(
                "seed: 1337\nclang: {}\nopt: {opt}\npasses: [split-basic-blocks, bogus-cf]\n\
                 opt-args: [\"-stats\"]\nopt-env:\n  GRAFT_SEED: \"9\"\n",
                dir.path().display()
            ),
        )
        .unwrap();

        let original = argv(&[
            "--graft-config-path",
            &path.to_string_lossy(),
            "--graft-retain-temp-dir",
            "-c",
            "hello.c",
        ]);
        let (rest, config) = Config::extract(&original).unwrap();
        let config = config.unwrap();
        assert_eq!(rest, argv(&["-c", "hello.c"]));
        assert_eq!(config.seed, 1337);
        assert_eq!(config.passes, vec!["split-basic-blocks", "bogus-cf"]);
        assert_eq!(config.opt_args, vec!["-stats"]);
        assert_eq!(config.opt_env.get("GRAFT_SEED").map(String::as_str), Some("9"));
        assert!(config.retain_workspace);
        assert!(!config.dry_run);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_an_opt_binary_that_is_not_llvm() {
        let dir = tempfile::tempdir().unwrap();
        let opt = fake_binary(dir.path(), "opt", "definitely not that project");
        let path = dir.path().join("graft.yaml");
        std::fs::write(
            &path,
            format!("seed: 1\nclang: {}\nopt: {opt}\n", dir.path().display()),
        )
        .unwrap();
        let err = Config::from_file(&path.to_string_lossy()).unwrap_err();
        assert!(matches!(err, ConfigError::WrongBinary { .. }));
    }
}
