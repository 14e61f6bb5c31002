use super::*;
use crate::error::BitResult;
use crate::repo::BitRepo;
use crate::serialize::{Deserialize, Serialize};
use crate::signature::BitSignature;
use std::io::BufReader;
use std::str::FromStr;

#[test]
fn test_create_branch_on_empty_repo() -> BitResult<()> {
    BitRepo::with_empty_repo(|repo| {
        repo.create_branch(symbolic_ref!("refs/heads/some-branch"), &rev!("HEAD"))?;
        assert_eq!(repo.read_head()?, symbolic_ref!("refs/heads/master"));
        assert_eq!(
            repo.read_ref(symbolic_ref!("refs/heads/some-branch"))?,
            repo.resolve_ref(BitRef::HEAD)?
        );
        Ok(())
    })
}

#[test]
fn test_ls_refs_on_empty_repo() -> BitResult<()> {
    BitRepo::with_empty_repo(|repo| {
        let refs = repo.ls_refs()?;
        // although refs/heads/master is pointed to by HEAD it doesn't actually exist on the
        // file system yet (there's nothing to commit)
        assert_eq!(refs, btreeset! { symbolic!("HEAD") });
        Ok(())
    })
}

#[test]
fn test_ls_refs_on_sample_repo() -> BitResult<()> {
    BitRepo::with_sample_repo(|repo| {
        let refs = repo.ls_refs()?;
        assert_eq!(
            refs,
            btreeset! {
                symbolic!("HEAD") ,
                symbolic!("refs/heads/master") ,
            }
        );
        Ok(())
    })
}

#[test]
fn test_resolve_symref_that_points_to_nonexistent_file() -> BitResult<()> {
    BitRepo::with_empty_repo(|repo| {
        // repo initializes with `HEAD` pointing to `refs/heads/master`
        // resolving nonexistent symbolic ref should just return itself (minus the prefix)
        assert_eq!(repo.try_fully_resolve_ref(symbolic_ref!("ref: refs/heads/master"))?, None);
        Ok(())
    })
}

#[test]
fn test_resolve_head_symref_in_fresh_repo() -> BitResult<()> {
    BitRepo::with_empty_repo(|repo| {
        // it should only resolve until `refs/heads/master` as the branch file doesn't exist yet
        assert_eq!(repo.resolve_ref(BitRef::HEAD)?, symbolic_ref!("refs/heads/master"));
        Ok(())
    })
}

#[test]
fn test_resolve_head_symref() -> BitResult<()> {
    BitRepo::with_minimal_repo(|repo| {
        // HEAD -> `refs/heads/master` should exist on a non empty repo, then it should resolve to the oid contained within master
        let direct = repo.resolve_ref(BitRef::HEAD)?;
        assert_eq!(direct, BitRef::Direct(repo.fully_resolve_ref(BitRef::HEAD)?));
        Ok(())
    })
}

#[test]
fn test_create_branch() -> BitResult<()> {
    BitRepo::with_sample_repo(|repo| {
        repo.create_branch(symbolic_ref!("refs/heads/new-branch"), &rev!("HEAD"))?;
        Ok(())
    })
}

#[test]
fn test_create_branch_already_exists_is_rejected() -> BitResult<()> {
    BitRepo::with_sample_repo(|repo| {
        assert!(repo.create_branch(symbolic_ref!("refs/heads/master"), &rev!("HEAD")).is_err());
        Ok(())
    })
}

#[test]
fn test_get_ref_search_order_finds_branch_by_short_name() -> BitResult<()> {
    BitRepo::with_sample_repo(|repo| {
        let refdb = repo.refdb()?;
        assert_eq!(refdb.get_ref("master")?, Some(refdb.read(symbolic!("refs/heads/master"))?));
        assert_eq!(refdb.get_ref("nonexistent-branch")?, None);
        Ok(())
    })
}

#[test]
fn test_symbolic_ref_cycle_is_rejected() -> BitResult<()> {
    BitRepo::with_empty_repo(|repo| {
        let refdb = repo.refdb()?;
        refdb.update(
            symbolic!("refs/heads/a"),
            BitRef::Symbolic(symbolic!("refs/heads/b")),
            RefUpdateCause::Update("test".to_owned()),
        )?;
        refdb.update(
            symbolic!("refs/heads/b"),
            BitRef::Symbolic(symbolic!("refs/heads/a")),
            RefUpdateCause::Update("test".to_owned()),
        )?;
        assert!(refdb.resolve(BitRef::Symbolic(symbolic!("refs/heads/a"))).is_err());
        Ok(())
    })
}

#[test]
fn test_branch_regex() {
    assert!(is_valid_name("sometext"));
    assert!(!is_valid_name(".test"));
    assert!(!is_valid_name("test.."));
    assert!(!is_valid_name("tes t"));
    assert!(!is_valid_name("tes~y"));
    assert!(!is_valid_name("te*s"));
    assert!(!is_valid_name("file.lock"));
    assert!(!is_valid_name("file@{}"));
    assert!(!is_valid_name("caret^"));
    assert!(!is_valid_name("badendingslash/"));
    assert!(!is_valid_name("bads/.dot"));
}

#[test]
fn test_parse_reflog() {
    let s = include_str!("../../tests/files/sample-reflog");
    BitReflog::from_str(s).expect("failed to parse valid reflog");
}

#[test]
fn test_parse_reflog_entry() {
    let s = "95a612b0afcae388c4f9fb9ddf4dba489919b766 4f0b23654b5ffc3a994ec4bf0212ed8dc4358400 Andy Yu <andyyu2004@gmail.com> 1622453485 +1200	commit: some commit message";
    let entry = BitReflogEntry::from_str(s).unwrap();
    assert_eq!(
        entry,
        BitReflogEntry {
            old_oid: "95a612b0afcae388c4f9fb9ddf4dba489919b766".into(),
            new_oid: "4f0b23654b5ffc3a994ec4bf0212ed8dc4358400".into(),
            committer: BitSignature::from_str("Andy Yu <andyyu2004@gmail.com> 1622453485 +1200")
                .unwrap(),
            message: "commit: some commit message".into(),
        }
    );
}

#[test]
fn test_parse_reflog_tolerates_truncated_trailing_line() {
    // a reader racing a writer mid-append can observe a half-written last line;
    // it should be dropped rather than failing the whole parse
    let complete = "0000000000000000000000000000000000000000 95a612b0afcae388c4f9fb9ddf4dba489919b766 Andy Yu <andyyu2004@gmail.com> 1622453485 +1200\tcommit (initial): initial commit";
    let truncated = format!("{}\n95a612b0afcae388c4f9fb9ddf4dba489919b766 4f0b2365", complete);
    let reflog = BitReflog::from_str(&truncated).expect("truncated trailing line should be dropped, not fail the parse");
    assert_eq!(reflog.len(), 1);
    assert_eq!(reflog[0].message, "commit (initial): initial commit");
}

#[test]
fn test_parse_reflog_rejects_corrupted_middle_line() {
    let complete = "0000000000000000000000000000000000000000 95a612b0afcae388c4f9fb9ddf4dba489919b766 Andy Yu <andyyu2004@gmail.com> 1622453485 +1200\tcommit (initial): initial commit";
    let corrupted = format!("not a valid reflog line\n{}", complete);
    assert!(BitReflog::from_str(&corrupted).is_err());
}

#[test]
fn test_deserialize_then_reserialize_reflog() -> BitResult<()> {
    let bytes = &include_bytes!("../../tests/files/sample-reflog")[..];
    let mut reader = BufReader::new(bytes);
    let reflog = BitReflog::deserialize(&mut reader)?;
    let mut buf = vec![];
    reflog.serialize(&mut buf)?;

    assert_eq!(bytes, &buf);
    Ok(())
}

#[test]
fn test_reflog_appends_on_ref_update() -> BitResult<()> {
    BitRepo::with_empty_repo(|repo| {
        let refdb = repo.refdb()?;
        let sym = symbolic_ref!("refs/heads/master");
        let committer = BitSignature::from_env()?;

        let first = Oid::from_str("8355cda6f48d8b8abe5df8314f7c24cb9dd38af4")?;
        refdb.update(sym, BitRef::Direct(first), RefUpdateCause::Update("initial".to_owned()))?;

        let reflog = refdb.read_reflog(sym)?;
        assert_eq!(reflog.len(), 1);
        assert_eq!(reflog[0].old_oid, Oid::UNKNOWN);
        assert_eq!(reflog[0].new_oid, first);
        assert_eq!(reflog[0].committer, committer);
        assert_eq!(reflog[0].message, "initial");
        drop(reflog);

        let second = Oid::from_str("902e59e7eadc1c44586354c9ecb3098fb316c2c4")?;
        refdb.update(sym, BitRef::Direct(second), RefUpdateCause::Update("second".to_owned()))?;

        let reflog = refdb.read_reflog(sym)?;
        assert_eq!(reflog.len(), 2);
        // newest first
        assert_eq!(reflog[0].old_oid, first);
        assert_eq!(reflog[0].new_oid, second);
        assert_eq!(reflog[0].message, "second");
        assert_eq!(reflog[1].new_oid, first);
        Ok(())
    })
}
