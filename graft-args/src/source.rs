use std::path::Path;

use crate::Argv;

/// Source language of a translation unit, judged by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    C,
    Cpp,
    ObjC,
    Unknown,
}

impl SourceKind {
    /// Classifies a path by its extension. Case-sensitive, like the drivers
    /// themselves.
    pub fn from_path(path: &str) -> SourceKind {
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some("c") => SourceKind::C,
            Some("cpp") | Some("cc") | Some("cxx") | Some("c++") => SourceKind::Cpp,
            Some("m") => SourceKind::ObjC,
            _ => SourceKind::Unknown,
        }
    }
}

/// Picks the translation unit's (basename, kind) out of a command line.
///
/// Two heuristics, first hit wins:
/// 1. The value of `-c`. Most drivers put the source path there, but that is
///    convention, not contract.
/// 2. The first element whose extension is a recognized source extension.
///
/// Returns an empty name and [`SourceKind::Unknown`] when both fail. Callers
/// must tolerate that and default to the C++-capable driver.
pub fn classify_source(argv: &Argv) -> (String, SourceKind) {
    if let Some(value) = argv.flag_value("-c") {
        if !value.is_empty() {
            let name = basename(value);
            let kind = SourceKind::from_path(&name);
            return (name, kind);
        }
    }

    for elem in argv.iter() {
        let name = basename(elem);
        let kind = SourceKind::from_path(&name);
        if kind != SourceKind::Unknown {
            return (name, kind);
        }
    }

    (String::new(), SourceKind::Unknown)
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
        .to_string()
}
