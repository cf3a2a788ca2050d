use std::path::{Path, PathBuf};

use graft_args::SourceKind;
use graft_core::config::verify_clang_binary;
use log::debug;
use miette::{IntoDiagnostic, Report};

/// Toolchain directory baked in at release time, so a graft binary dropped
/// into a build can find its clang without any configuration.
pub const DEFAULT_CLANG_DIR: Option<&str> = option_env!("GRAFT_DEFAULT_CLANG_DIR");

/// Selects the driver binary name.
///
/// Both inputs are explicit: how graft itself was invoked (it may be
/// installed under a `clang*` name as a drop-in substitute) and the
/// translation unit's language. `clang` and `clang++` differ in what they
/// link, so C++ and Objective-C go to `clang++`, and so does Unknown —
/// the C++-capable driver is the permissive default.
pub fn binary_name(invoked_as: &str, kind: SourceKind) -> String {
    if invoked_as != "graft" && invoked_as.starts_with("clang") {
        return invoked_as.to_string();
    }
    match kind {
        SourceKind::C => "clang".to_string(),
        SourceKind::Cpp | SourceKind::ObjC | SourceKind::Unknown => "clang++".to_string(),
    }
}

/// Resolves the concrete driver binary under a configured clang path, which
/// may name either the binary itself or a directory of driver binaries.
pub fn resolve(clang_path: &str, binary_name: &str) -> Result<PathBuf, Report> {
    let base = PathBuf::from(clang_path);
    let candidate = if base.is_dir() {
        base.join(binary_name)
    } else {
        base
    };
    let candidate = prefer_original(candidate);
    verify_clang_binary(&candidate)?;
    Ok(candidate)
}

/// Resolves a driver binary without any configuration: the baked-in default
/// directory when present, otherwise a `$PATH` lookup.
pub fn resolve_default(binary_name: &str) -> Result<PathBuf, Report> {
    if let Some(dir) = DEFAULT_CLANG_DIR {
        return Ok(prefer_original(Path::new(dir).join(binary_name)));
    }
    which::which(binary_name).into_diagnostic()
}

/// A `<driver>.original` sibling means graft has been symlinked over the
/// real driver; the preserved binary is the one to run.
fn prefer_original(path: PathBuf) -> PathBuf {
    let preserved = PathBuf::from(format!("{}.original", path.display()));
    if preserved.exists() {
        debug!("using preserved driver {}", preserved.display());
        preserved
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_in_clang_names_are_reused_verbatim() {
        assert_eq!(binary_name("clang-17", SourceKind::C), "clang-17");
        assert_eq!(binary_name("clang++", SourceKind::C), "clang++");
    }

    #[test]
    fn language_selects_the_driver() {
        assert_eq!(binary_name("graft", SourceKind::C), "clang");
        assert_eq!(binary_name("graft", SourceKind::Cpp), "clang++");
        assert_eq!(binary_name("graft", SourceKind::ObjC), "clang++");
        assert_eq!(binary_name("graft", SourceKind::Unknown), "clang++");
    }

    #[test]
    fn non_clang_invocation_names_fall_back_to_language() {
        assert_eq!(binary_name("cc-wrapper", SourceKind::C), "clang");
    }

    #[cfg(unix)]
    #[test]
    fn prefers_a_preserved_original_binary() {
        let dir = tempfile::tempdir().unwrap();
        let shim = dir.path().join("clang");
        let preserved = dir.path().join("clang.original");
        std::fs::write(&shim, "").unwrap();
        std::fs::write(&preserved, "").unwrap();
        assert_eq!(prefer_original(shim.clone()), preserved);

        std::fs::remove_file(&preserved).unwrap();
        assert_eq!(prefer_original(shim.clone()), shim);
    }
}
