use crate::error::BitGenericError;
use crate::path::BitPath;
use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

/// A pathspec selects a subset of worktree paths to stage.
///
/// unlike the original tool's pathspec grammar, this supports only a single
/// non-wildcard prefix (no `:(glob)` magic, no globbing): `add <dir>` matches
/// every path under `<dir>`, and `add .` matches everything.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Pathspec {
    pub prefix: BitPath,
}

impl Pathspec {
    pub fn new(prefix: BitPath) -> Self {
        Self { prefix }
    }

    /// a pathspec that matches every path (`.`)
    pub fn match_all() -> Self {
        Self::new(BitPath::EMPTY)
    }

    pub fn matches_path(&self, path: impl AsRef<Path>) -> bool {
        self.prefix.is_empty() || path.as_ref().starts_with(self.prefix)
    }
}

impl TryFrom<&str> for Pathspec {
    type Error = BitGenericError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::from_str(s)
    }
}

impl FromStr for Pathspec {
    type Err = BitGenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            return Ok(Self::match_all());
        }
        Ok(Self::new(BitPath::intern(s)))
    }
}

impl Display for Pathspec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_is_match_all() {
        assert_eq!(Pathspec::from_str(".").unwrap(), Pathspec::match_all());
    }

    #[test]
    fn prefix_matches_subpaths() {
        let pathspec = Pathspec::from_str("dir").unwrap();
        assert!(pathspec.matches_path("dir/a"));
        assert!(pathspec.matches_path("dir"));
        assert!(!pathspec.matches_path("dirother"));
        assert!(!pathspec.matches_path("other/dir"));
    }

    #[test]
    fn match_all_matches_everything() {
        let pathspec = Pathspec::match_all();
        assert!(pathspec.matches_path("anything"));
        assert!(pathspec.matches_path(""));
    }
}
