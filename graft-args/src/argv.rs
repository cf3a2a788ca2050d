use std::fmt;

use regex::Regex;

/// An ordered compiler-driver command line.
///
/// Compiler drivers are order-sensitive, so elements keep their insertion
/// order and duplicates are allowed. There is no structural flag/value
/// binding: a flag's value is whatever element happens to follow it, which is
/// why every removal operation states explicitly whether it consumes the
/// following token.
///
/// All rewrite operations return a new `Argv`; each pipeline stage derives
/// its own vector from the original invocation and never mutates a vector
/// owned by another stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Argv(Vec<String>);

impl Argv {
    pub fn new() -> Self {
        Argv(Vec::new())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes the first exact occurrence of `flag`.
    ///
    /// With `also_remove_value`, the element immediately following the flag
    /// is removed too; if the flag is the last element, only the flag goes.
    /// No-op when `flag` is empty or absent. Callers that expect a flag more
    /// than once should use [`Argv::remove_all`].
    pub fn remove_flag(&self, flag: &str, also_remove_value: bool) -> Argv {
        if flag.is_empty() {
            return self.clone();
        }
        let Some(index) = self.0.iter().position(|elem| elem == flag) else {
            return self.clone();
        };
        let mut out = self.0.clone();
        out.remove(index);
        if also_remove_value && index < out.len() {
            out.remove(index);
        }
        Argv(out)
    }

    /// Removes every exact occurrence of `flag`.
    ///
    /// Some toolchains inject the same flag several times (`-fembed-bitcode`
    /// shows up twice in Xcode builds), so duplicate-prone flags go through
    /// here instead of repeated [`Argv::remove_flag`] calls.
    pub fn remove_all(&self, flag: &str, also_remove_value: bool) -> Argv {
        if flag.is_empty() {
            return self.clone();
        }
        let mut out = self.clone();
        while out.has_flag(flag) {
            out = out.remove_flag(flag, also_remove_value);
        }
        out
    }

    /// Removes every element matched by `pattern`.
    ///
    /// Matching is unanchored and has no awareness of flag/value pairing: a
    /// value token that happens to match is removed independently of its
    /// flag. No-op for an empty pattern.
    pub fn remove_matching(&self, pattern: &Regex) -> Argv {
        if pattern.as_str().is_empty() {
            return self.clone();
        }
        Argv(
            self.0
                .iter()
                .filter(|elem| !pattern.is_match(elem))
                .cloned()
                .collect(),
        )
    }

    /// Appends `flag`, then `value` if non-empty. No-op for an empty flag.
    ///
    /// Insertion is always at the end; the drivers we rewrite tolerate any
    /// position for the flags this tool injects.
    pub fn add_flag(&self, flag: &str, value: &str) -> Argv {
        if flag.is_empty() {
            return self.clone();
        }
        let mut out = self.0.clone();
        out.push(flag.to_string());
        if !value.is_empty() {
            out.push(value.to_string());
        }
        Argv(out)
    }

    /// Whether any element equals `flag` exactly.
    pub fn has_flag(&self, flag: &str) -> bool {
        if flag.is_empty() {
            return false;
        }
        self.0.iter().any(|elem| elem == flag)
    }

    /// The element following the first exact occurrence of `flag`, if any.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        if flag.is_empty() {
            return None;
        }
        let index = self.0.iter().position(|elem| elem == flag)?;
        self.0.get(index + 1).map(String::as_str)
    }
}

impl From<Vec<String>> for Argv {
    fn from(args: Vec<String>) -> Self {
        Argv(args)
    }
}

impl<S: Into<String>> FromIterator<S> for Argv {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Argv(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Argv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}
