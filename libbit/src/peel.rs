use crate::error::{BitError, BitResult};
use crate::obj::{BitObject, BitObjType, Commit, Oid, Tree};
use crate::repo::BitRepo;

// experimental
pub trait Peel<'rcx> {
    type Peeled;
    fn peel(&self, repo: BitRepo<'rcx>) -> BitResult<Self::Peeled>;
}

// peeling oid into a commit makes more sense than peeling into a tree
// as we can just use treeish for that
// furthermore, we often want the tree oid given an commit_oid
// however, this is sort of subtle/arbitrary and probably not great design
impl<'rcx> Peel<'rcx> for Oid {
    type Peeled = Commit<'rcx>;

    fn peel(&self, repo: BitRepo<'rcx>) -> BitResult<Self::Peeled> {
        repo.read_obj(*self)?.try_into_commit()
    }
}

impl<'rcx> Peel<'rcx> for Commit<'rcx> {
    type Peeled = Tree<'rcx>;

    fn peel(&self, repo: BitRepo<'rcx>) -> BitResult<Self::Peeled> {
        debug_assert!(repo == self.owner());
        Ok(self.owner().read_obj_tree(self.tree)?)
    }
}

/// follows `oid` through any chain of annotated tags (as `^{}`/`^{type}` revision
/// syntax requires) until it reaches an object that isn't a tag.
///
/// `target` selects the final object type to peel to (as in `^{commit}`); `None`
/// implements the bare `^{}` form, which just strips tags and stops at whatever is
/// underneath. when `target` is [`BitObjType::Tree`] and the dereferenced object is
/// a commit, the commit's tree is returned (matching git's `rev^{tree}` behaviour).
pub fn peel_to_type(
    repo: BitRepo<'_>,
    mut oid: Oid,
    target: Option<BitObjType>,
) -> BitResult<Oid> {
    loop {
        let header = repo.read_obj_header(oid)?;
        if let Some(target) = target {
            if header.obj_type == target {
                return Ok(oid);
            }
            if header.obj_type == BitObjType::Commit && target == BitObjType::Tree {
                return Ok(repo.read_obj_commit(oid)?.tree);
            }
        } else if header.obj_type != BitObjType::Tag {
            return Ok(oid);
        }

        match header.obj_type {
            BitObjType::Tag => oid = repo.read_obj(oid)?.try_into_tag()?.target,
            actual =>
                if let Some(expected) = target {
                    return Err(anyhow!(BitError::IncorrectObjectType { oid, expected, actual }));
                } else {
                    return Ok(oid);
                },
        }
    }
}
