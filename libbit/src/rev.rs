use crate::error::{BitError, BitGenericError, BitResult, BitResultExt};
use crate::obj::{BitObjType, Commit, Oid, PartialOid};
use crate::path::BitPath;
use crate::peel::{peel_to_type, Peel};
use crate::refs::{BitRef, BitRefDbBackend, SymbolicRef};
use crate::repo::BitRepo;
use lazy_static::lazy_static;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

// <rev> ::=
//   | <ref>
//   | <partial-oid>
//   | <rev>^<n>?
//   | <rev>~<n>?
//   | <rev>^{<type>}
//   | <rev>^{}
//   | <rev>:<path>
//   | <describe-form>  (NAME-N-g<hex> or NAME-g<hex>, resolved via the hex suffix)
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRevspec {
    Ref(BitRef),
    Partial(PartialOid),
    /// nth parent selector ^2 means select the 2nd parent
    /// defaults to 1 if unspecified
    /// if n == 0, then this is a noop
    Parent(Box<ParsedRevspec>, usize),
    /// ~<n>
    Ancestor(Box<ParsedRevspec>, usize),
    /// <rev>@{<n>}
    Reflog(Box<ParsedRevspec>, usize),
    /// `<rev>^{<type>}` peels through tag chains to an object of `<type>`;
    /// `<rev>^{}` (`None`) just strips tag layers without constraining the result type.
    TypePeel(Box<ParsedRevspec>, Option<BitObjType>),
    /// `<rev>:<path>` looks up `path` inside the tree of the commit-peeled `<rev>`.
    /// an empty path resolves to the tree itself.
    Path(Box<ParsedRevspec>, BitPath),
}

impl<'rcx> BitRepo<'rcx> {
    /// resolve a revision to a commit oid
    pub fn fully_resolve_rev(self, rev: &Revspec) -> BitResult<Oid> {
        let reference = self.resolve_rev(rev)?;
        self.fully_resolve_ref(reference)
    }

    /// like [`Self::fully_resolve_rev`], but the caller is a context (`cat-file`, `rev-parse`,
    /// `^{type}` peeling, ...) that doesn't require the final object to be a commit: a bare
    /// `<oid>` or `<oid>:<path>` may legitimately resolve to a tree or blob. the distinction
    /// from `fully_resolve_rev` only matters when the expression uses `^<n>`/`~<n>`, which
    /// always require their operand to be (peelable to) a commit regardless of which of these
    /// two entry points was used.
    pub fn fully_resolve_rev_to_any(self, rev: &Revspec) -> BitResult<Oid> {
        self.fully_resolve_rev(rev)
    }

    /// like [`Self::fully_resolve_rev`] but maps any `NotFound`-flavoured failure along
    /// the way (missing ref, missing tree-path component, ...) to `None` rather than
    /// propagating it as an error; still propagates fatal errors (corrupt, io, ambiguity)
    pub fn try_fully_resolve_rev(self, rev: &Revspec) -> BitResult<Option<Oid>> {
        match self.resolve_rev(rev) {
            Ok(reference) => self.try_fully_resolve_ref(reference),
            Err(err) if err.is_not_found_err() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// resolve a revision to a reference (either a branch or a commit, never HEAD itself)
    pub fn resolve_rev(self, rev: &Revspec) -> BitResult<BitRef> {
        self.resolve_rev_internal(rev.parse(self)?)
    }

    pub fn resolve_rev_to_commit(self, rev: &Revspec) -> BitResult<Commit<'rcx>> {
        self.fully_resolve_rev(rev)?.peel(self)
    }

    pub fn resolve_rev_to_branch(self, rev: &Revspec) -> BitResult<SymbolicRef> {
        match self.resolve_rev(rev)? {
            BitRef::Direct(..) => bail!("expected branch, found commit `{}`", rev),
            BitRef::Symbolic(sym) => Ok(sym),
        }
    }

    fn resolve_rev_internal(&self, rev: &ParsedRevspec) -> BitResult<BitRef> {
        let get_nth_parent = |reference, n| -> BitResult<BitRef> {
            let oid = self.fully_resolve_ref(reference)?;

            if n == 0 {
                return Ok(BitRef::Direct(oid));
            }

            let obj_type = self.read_obj_header(oid)?.obj_type;
            if obj_type != BitObjType::Commit {
                return Err(anyhow!(BitError::IncorrectObjectType {
                    oid,
                    expected: BitObjType::Commit,
                    actual: obj_type,
                }));
            }

            let commit = self.read_obj_commit(oid)?;
            let parentc = commit.parents.len();

            if parentc == 0 {
                bail!("revision `{}` refers to the parent of an initial commit", rev)
            }

            // TODO testing nth parent selection once we have merging
            match commit.parents.get(n - 1) {
                Some(&parent) => Ok(BitRef::Direct(parent)),
                None => bail!(
                    "attempted to access parent {} (indexed starting from 1) of commit `{}` but it only has {} parent{}",
                    n,
                    oid,
                    parentc,
                    pluralize!(parentc),
                ),
            }
        };

        let get_first_parent = |reference| get_nth_parent(reference, 1);

        match *rev {
            // we want to resolve HEAD once
            ParsedRevspec::Ref(r) if r == BitRef::HEAD => self.read_head(),
            ParsedRevspec::Ref(r) => self.validate_ref(r),
            ParsedRevspec::Partial(prefix) => self.expand_prefix(prefix).map(BitRef::Direct),
            ParsedRevspec::Parent(ref inner, n) =>
                self.resolve_rev_internal(inner).and_then(|r| get_nth_parent(r, n)),
            ParsedRevspec::Ancestor(ref rev, n) =>
                (0..n).try_fold(self.resolve_rev_internal(rev)?, |oid, _| get_first_parent(oid)),
            ParsedRevspec::Reflog(ref inner, n) => match self.resolve_rev_internal(inner)? {
                BitRef::Direct(..) =>
                    bail!("can't use reflog revision syntax on a direct reference"),
                BitRef::Symbolic(sym) => {
                    let reflog = self.refdb()?.read_reflog(sym)?;
                    let entry = match reflog.get(n) {
                        Some(entry) => entry,
                        None => bail!(
                            "index `{}` is out of range in reflog with `{}` entries",
                            n,
                            reflog.len()
                        ),
                    };
                    Ok(BitRef::Direct(entry.new_oid))
                }
            },
            ParsedRevspec::TypePeel(ref inner, target) => {
                let reference = self.resolve_rev_internal(inner)?;
                let oid = self.fully_resolve_ref(reference)?;
                Ok(BitRef::Direct(peel_to_type(*self, oid, target)?))
            }
            ParsedRevspec::Path(ref inner, path) => {
                let reference = self.resolve_rev_internal(inner)?;
                let oid = self.fully_resolve_ref(reference)?;
                // the path form always operates on the tree of the commit-peeled rev,
                // even if `inner` itself already names a tree or tag
                let commit_oid = peel_to_type(*self, oid, Some(BitObjType::Commit))?;
                if path.is_empty() {
                    let commit = self.read_obj_commit(commit_oid)?;
                    return Ok(BitRef::Direct(commit.tree));
                }
                let tree = self.read_obj_tree(self.read_obj_commit(commit_oid)?.tree)?;
                let (_mode, oid) = tree.find_path(*path)?;
                Ok(BitRef::Direct(oid))
            }
        }
    }
}

impl Display for ParsedRevspec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParsedRevspec::Ref(r) => write!(f, "{}", r),
            ParsedRevspec::Partial(prefix) => write!(f, "{}", prefix),
            ParsedRevspec::Parent(rev, n) =>
                if *n == 1 {
                    write!(f, "{}^", rev)
                } else {
                    write!(f, "{}^{}", rev, n)
                },
            ParsedRevspec::Ancestor(rev, n) =>
                if *n == 1 {
                    write!(f, "{}^", rev)
                } else {
                    write!(f, "{}~{}", rev, n)
                },
            ParsedRevspec::Reflog(rev, n) => write!(f, "{}@{{{}}}", rev, n),
            ParsedRevspec::TypePeel(rev, None) => write!(f, "{}^{{}}", rev),
            ParsedRevspec::TypePeel(rev, Some(ty)) => write!(f, "{}^{{{}}}", rev, ty),
            ParsedRevspec::Path(rev, path) => write!(f, "{}:{}", rev, path),
        }
    }
}

// pretty weird wrapper around revspec
// problem is revspec requires repo to be properly evaluated (as it requires some context to be parsed properly)
// but we want FromStr to be implemented so clap can use it
// this wrapper can lazily evaluated to get a parsed revspec (via `parse`)
#[derive(Debug, PartialEq)]
pub struct Revspec {
    src: String,
    parsed: OnceCell<ParsedRevspec>,
}

impl Display for Revspec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.src)
    }
}

impl Revspec {
    pub fn parse(&self, repo: BitRepo<'_>) -> BitResult<&ParsedRevspec> {
        self.parsed.get_or_try_init(|| RevspecParser::new(repo, &self.src).parse_top())
    }
}

impl FromStr for Revspec {
    type Err = BitGenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { src: s.to_owned(), parsed: Default::default() })
    }
}

lazy_static! {
    static ref REV_SEPS: HashSet<char> = hashset! {
        '@', '~', '^', '{', '}'
    };
    /// `git describe` output embeds the object id as a `g<hex>` suffix, optionally
    /// preceded by `-<n>-` counting commits since the described tag; e.g.
    /// `v1.2.3-14-g7f82283` or the no-commits-since form `v1.2.3-g7f82283`.
    static ref DESCRIBE_SUFFIX: Regex = Regex::new(r"-g([0-9a-fA-F]{4,40})$").unwrap();
}

struct RevspecParser<'a, 'rcx> {
    repo: BitRepo<'rcx>,
    src: &'a str,
}

impl<'a, 'rcx> RevspecParser<'a, 'rcx> {
    pub fn new(repo: BitRepo<'rcx>, src: &'a str) -> Self {
        Self { repo, src }
    }

    // moves src to the index of separator and returns the str before the separator
    fn next(&mut self) -> BitResult<&str> {
        let i = self.src.find(|c| REV_SEPS.contains(&c)).unwrap_or_else(|| self.src.len());
        let s = &self.src[..i];
        self.src = &self.src[i..];
        Ok(s)
    }

    /// either a partialoid or a ref
    fn parse_base(&mut self) -> BitResult<ParsedRevspec> {
        let repo = self.repo;
        // some hacky special case for parsing the alias @ for HEAD
        // it's a bit annoying as @ is both a separator and a valid base
        let s = if &self.src[0..1] == "@" {
            self.src = &self.src[1..];
            "@"
        } else {
            self.next()?
        };

        // `git describe` output (`NAME-N-g<hex>`/`NAME-g<hex>`): take the hex suffix
        // as the id and ignore the descriptive prefix; further suffix operators
        // (`^`, `~`, `@{..}`) still apply normally to whatever this resolves to
        if let Some(captures) = DESCRIBE_SUFFIX.captures(s) {
            let hex = captures.get(1).unwrap().as_str();
            let reference = if hex.len() == 40 {
                BitRef::Direct(Oid::from_str(hex)?)
            } else {
                BitRef::Direct(repo.expand_prefix(PartialOid::from_str(hex)?)?)
            };
            return Ok(ParsedRevspec::Ref(reference));
        }

        // try parse as a `partial_oid` first and try expand it
        // otherwise just parse it as a ref (either symbolic or direct)
        // there is no guarantee the ref is valid
        let reference = if let Ok(r) =
            PartialOid::from_str(s).and_then(|prefix| repo.expand_prefix(prefix)).map(BitRef::from)
        {
            r
        } else {
            BitRef::from_str(s)?
        };

        Ok(ParsedRevspec::Ref(reference))
    }

    fn expect(&mut self, s: &str) -> BitResult<()> {
        let n = s.len();
        if &self.src[..n] == s {
            self.src = &self.src[n..];
            Ok(())
        } else {
            bail!("expected `{}`, found `{}`", s, &self.src[..n])
        }
    }

    fn expect_num(&mut self) -> BitResult<usize> {
        Ok(usize::from_str(self.next()?)?)
    }

    fn accept_num(&mut self) -> Option<usize> {
        self.expect_num().ok()
    }

    /// entry point: splits off a `:<path>` suffix (which terminates the identifier
    /// portion and is never itself subject to `^`/`~`/`@{..}` parsing) before handing
    /// the remainder to [`Self::parse`]. a `:` can only appear here, never inside the
    /// rev part, so a plain `find` for the first occurrence is unambiguous.
    pub fn parse_top(mut self) -> BitResult<ParsedRevspec> {
        match self.src.find(':') {
            None => self.parse(),
            Some(idx) => {
                let (rev_part, path_part) = self.src.split_at(idx);
                let path_part = &path_part[1..];
                let rev = if rev_part.is_empty() {
                    ParsedRevspec::Ref(BitRef::HEAD)
                } else {
                    Self { repo: self.repo, src: rev_part }.parse()?
                };
                Ok(ParsedRevspec::Path(Box::new(rev), BitPath::intern(path_part)))
            }
        }
    }

    fn parse(mut self) -> BitResult<ParsedRevspec> {
        let mut rev = self.parse_base()?;
        while !self.src.is_empty() {
            let (c, cs) = self.src.split_at(1);
            self.src = cs;
            match c {
                "^" if self.src.starts_with('{') => {
                    self.src = &self.src[1..];
                    let end = self
                        .src
                        .find('}')
                        .ok_or_else(|| anyhow!("expected `}}` to close `^{{...}}`"))?;
                    let kind = &self.src[..end];
                    self.src = &self.src[end + 1..];
                    let target = match kind {
                        "" => None,
                        "commit" => Some(BitObjType::Commit),
                        "tree" => Some(BitObjType::Tree),
                        "blob" => Some(BitObjType::Blob),
                        "tag" => Some(BitObjType::Tag),
                        _ => bail!("unknown object type `{}` in `^{{...}}`", kind),
                    };
                    rev = ParsedRevspec::TypePeel(Box::new(rev), target);
                }
                "^" => {
                    let n = self.accept_num().unwrap_or(1);
                    rev = ParsedRevspec::Parent(Box::new(rev), n)
                }
                "~" => {
                    let n = self.accept_num().unwrap_or(1);
                    rev = ParsedRevspec::Ancestor(Box::new(rev), n);
                }
                "@" => {
                    self.expect("{")?;
                    let n = self.expect_num()?;
                    self.expect("}")?;
                    rev = ParsedRevspec::Reflog(Box::new(rev), n);
                }
                _ => bail!("unexpected token `{}`, while parsing revspec", c),
            }
        }
        Ok(rev)
    }
}
