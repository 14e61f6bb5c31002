use crate::obj::{BitId, BitObjType, Oid, PartialOid};
use crate::path::BitPath;
use crate::refs::SymbolicRef;
use thiserror::Error;

pub type BitResult<T> = Result<T, BitGenericError>;
pub type BitGenericError = anyhow::Error;

/// the error taxonomy of the store: `anyhow` is used for propagation/composition
/// (so callers can freely use `?`/`bail!`/`ensure!`), but every error that a caller
/// might want to match on is a variant here, reachable via `anyhow::Error::downcast`.
#[derive(Error, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum BitError {
    #[error("bit object with hash `{0}` not found")]
    ObjectNotFound(BitId),

    #[error("reference `{0}` does not exist")]
    RefNotFound(SymbolicRef),

    #[error("object `{0}` not found in pack index but could be inserted at `{1}`")]
    ObjectNotFoundInPackIndex(Oid, u64),

    #[error("prefix `{0}` is ambiguous")]
    AmbiguousPrefix(PartialOid, Vec<Oid>),

    #[error("{file}:{offset}: {reason}")]
    Corrupt { file: String, offset: u64, reason: String },

    #[error("`{oid}` is a {actual}, expected {expected}")]
    IncorrectObjectType { oid: Oid, expected: BitObjType, actual: BitObjType },

    #[error("path `{0}` does not exist in the tree (either missing, or an intermediate component is not a directory)")]
    PathNotFound(BitPath),

    #[error("invalid reference name `{0}`")]
    InvalidRefName(String),

    #[error("failed to acquire lock on `{0}`: another process may be writing to the repository")]
    LockFailed(String),

    #[error("ref update for `{0}` rejected: expected old value did not match")]
    Concurrent(SymbolicRef),

    #[error("object `{0}` of size {1} exceeds the streaming threshold; use a streaming reader")]
    LargeObject(Oid, u64),

    #[error("delta chain for object at offset {0} exceeds the maximum depth of {1} (cyclic or pathological delta chain)")]
    DeltaDepthExceeded(u64, usize),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    Timeout,
}

pub trait BitErrorExt {
    fn try_into_obj_not_found_err(self) -> BitResult<BitId>;
    fn try_into_bit_error(self) -> BitResult<BitError>;
    /// converts a [`BitError::RefNotFound`] into the symbolic ref it names; any other
    /// error (including a successfully downcast, but different, `BitError` variant) is
    /// propagated unchanged. lets callers like [`crate::repo::BitRepo::read_head`] treat
    /// "HEAD points at a ref that doesn't exist yet" as a value, not a failure.
    fn try_into_nonexistent_symref_err(self) -> BitResult<SymbolicRef>;
    /// converts a [`BitError::IncorrectObjectType`] raised while expecting a commit
    /// (e.g. taking the nth parent of a non-commit via `<rev>^<n>`) into the offending
    /// `(oid, actual type)` pair.
    fn try_into_expected_commit_error(self) -> BitResult<(Oid, BitObjType)>;
}

impl BitErrorExt for BitGenericError {
    fn try_into_bit_error(self) -> BitResult<BitError> {
        match self.downcast::<BitError>() {
            Ok(bit_error) => Ok(bit_error),
            Err(cast_failed_err) => Err(cast_failed_err),
        }
    }

    fn try_into_obj_not_found_err(self) -> BitResult<BitId> {
        match self.try_into_bit_error()? {
            BitError::ObjectNotFound(id) => Ok(id),
            err => Err(anyhow!(err)),
        }
    }

    fn try_into_nonexistent_symref_err(self) -> BitResult<SymbolicRef> {
        match self.try_into_bit_error()? {
            BitError::RefNotFound(sym) => Ok(sym),
            err => Err(anyhow!(err)),
        }
    }

    fn try_into_expected_commit_error(self) -> BitResult<(Oid, BitObjType)> {
        match self.try_into_bit_error()? {
            BitError::IncorrectObjectType { oid, expected: BitObjType::Commit, actual } =>
                Ok((oid, actual)),
            err => Err(anyhow!(err)),
        }
    }
}

pub trait BitResultExt {
    fn is_not_found_err(&self) -> bool;
    /// an error the object database should retry across alternates/backends for.
    /// everything else is propagated immediately (corruption, io, ambiguity, ...).
    fn is_fatal(&self) -> bool;
}

macro_rules! error_ext_is_method {
    ($method:ident) => {
        fn $method(&self) -> bool {
            match self {
                Ok(..) => false,
                Err(err) => err.$method(),
            }
        }
    };
}

impl<T> BitResultExt for BitResult<T> {
    error_ext_is_method!(is_not_found_err);

    error_ext_is_method!(is_fatal);
}

impl BitResultExt for BitGenericError {
    fn is_not_found_err(&self) -> bool {
        match self.downcast_ref::<BitError>() {
            Some(err) => matches!(
                err,
                BitError::ObjectNotFound(..)
                    | BitError::ObjectNotFoundInPackIndex(..)
                    | BitError::RefNotFound(..)
                    | BitError::PathNotFound(..)
            ),
            None => false,
        }
    }

    fn is_fatal(&self) -> bool {
        match self.downcast_ref::<BitError>() {
            Some(err) => !matches!(
                err,
                BitError::ObjectNotFound(..)
                    | BitError::ObjectNotFoundInPackIndex(..)
                    | BitError::RefNotFound(..)
                    | BitError::PathNotFound(..)
            ),
            None => true,
        }
    }
}
