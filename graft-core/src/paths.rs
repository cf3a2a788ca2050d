use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use miette::Diagnostic;
use regex::{Captures, Regex};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("failed to expand path {path}: {message}")]
#[diagnostic(code(graft::paths))]
pub struct PathError {
    pub path: String,
    pub message: String,
}

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("static pattern")
    })
}

/// Expands a path string to an absolute path.
///
/// Beyond plain absolutization this resolves `~` and `$VAR`/`${VAR}`
/// references against the ambient environment; unset variables expand to the
/// empty string, shell-style. With `follow_symlinks` the result is fully
/// canonicalized, otherwise symlinks are left alone. Leaving symlinks alone
/// matters for driver binaries: `clang++` is not just a symlink spelling of
/// `clang`, it changes what gets linked.
pub fn expand_path(path: &str, follow_symlinks: bool) -> Result<PathBuf, PathError> {
    let mut expanded = var_pattern()
        .replace_all(path, |caps: &Captures<'_>| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_default()
        })
        .into_owned();

    if expanded == "~" || expanded.starts_with("~/") {
        let home = std::env::var("HOME").map_err(|_| PathError {
            path: path.to_string(),
            message: "HOME is not set".to_string(),
        })?;
        expanded = format!("{home}{}", &expanded[1..]);
    }

    let result = if follow_symlinks {
        fs::canonicalize(&expanded)
    } else {
        std::path::absolute(&expanded)
    };
    result.map_err(|err| PathError {
        path: path.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_passes_through() {
        let out = expand_path("/tmp", true).unwrap();
        assert!(out.is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn expands_env_variables() {
        let home = std::env::var("HOME").unwrap();
        let out = expand_path("$HOME", false).unwrap();
        assert_eq!(out, std::path::absolute(&home).unwrap());

        let braced = expand_path("${HOME}", false).unwrap();
        assert_eq!(braced, out);
    }

    #[cfg(unix)]
    #[test]
    fn expands_tilde() {
        let home = std::env::var("HOME").unwrap();
        let out = expand_path("~", false).unwrap();
        assert_eq!(out, std::path::absolute(&home).unwrap());
    }

    #[test]
    fn relative_path_becomes_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let out = expand_path(&file.to_string_lossy(), true).unwrap();
        assert!(out.is_absolute());
        assert!(out.ends_with("a.txt"));
    }

    #[test]
    fn canonicalizing_a_missing_path_fails() {
        let err = expand_path("/definitely/not/here/graft", true).unwrap_err();
        assert_eq!(err.path, "/definitely/not/here/graft");
    }
}
