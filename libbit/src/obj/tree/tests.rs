use super::*;
use std::collections::BTreeSet;

fn entry(mode: FileMode, path: &str, oid: Oid) -> TreeEntry {
    TreeEntry { mode, path: BitPath::intern(path), oid }
}

fn encode(entries: &[TreeEntry]) -> Vec<u8> {
    let mut buf = vec![];
    for entry in entries {
        entry.serialize(&mut buf).unwrap();
    }
    buf
}

#[test]
fn test_mutable_tree_serialize_then_deserialize_roundtrip() -> BitResult<()> {
    let entries = btreeset! {
        entry(FileMode::REG, "bar", Oid::UNKNOWN),
        entry(FileMode::TREE, "dir", Oid::EMPTY_TREE),
        entry(FileMode::EXEC, "run.sh", Oid::UNKNOWN),
    };
    let tree = MutableTree::new(entries.into_iter().collect::<BTreeSet<_>>());
    let mut bytes = vec![];
    tree.serialize(&mut bytes)?;
    let parsed = MutableTree::deserialize_sized(&mut bytes.as_slice(), bytes.len() as u64)?;
    assert_eq!(tree, parsed);
    Ok(())
}

#[test]
fn test_raw_tree_entry_iter_forward() -> BitResult<()> {
    let entries = vec![
        entry(FileMode::REG, "bar.txt", Oid::UNKNOWN),
        entry(FileMode::TREE, "dir", Oid::EMPTY_TREE),
        entry(FileMode::EXEC, "run.sh", Oid::UNKNOWN),
    ];
    let buf = encode(&entries);

    let mut iter = RawTreeEntryIter::new(&buf);
    for expected in &entries {
        assert_eq!(iter.next()?.as_ref(), Some(expected));
    }
    assert_eq!(iter.next()?, None);
    Ok(())
}

#[test]
fn test_raw_tree_entry_iter_backward() -> BitResult<()> {
    let entries = vec![
        entry(FileMode::REG, "bar.txt", Oid::UNKNOWN),
        entry(FileMode::TREE, "dir", Oid::EMPTY_TREE),
        entry(FileMode::EXEC, "run.sh", Oid::UNKNOWN),
    ];
    let buf = encode(&entries);

    let mut iter = RawTreeEntryIter::new(&buf);
    for expected in entries.iter().rev() {
        assert_eq!(iter.next_back()?.as_ref(), Some(expected));
    }
    assert_eq!(iter.next_back()?, None);
    Ok(())
}

#[test]
fn test_raw_tree_entry_iter_backward_handles_name_with_embedded_space() -> BitResult<()> {
    // the separator search must not be fooled by the space inside `my file.txt`
    let entries = vec![
        entry(FileMode::REG, "a", Oid::UNKNOWN),
        entry(FileMode::REG, "my file.txt", Oid::UNKNOWN),
        entry(FileMode::TREE, "z", Oid::EMPTY_TREE),
    ];
    let buf = encode(&entries);

    let mut iter = RawTreeEntryIter::new(&buf);
    for expected in entries.iter().rev() {
        assert_eq!(iter.next_back()?.as_ref(), Some(expected));
    }
    assert_eq!(iter.next_back()?, None);
    Ok(())
}

#[test]
fn test_raw_tree_entry_iter_meet_in_the_middle() -> BitResult<()> {
    let entries = vec![
        entry(FileMode::REG, "a", Oid::UNKNOWN),
        entry(FileMode::REG, "b", Oid::UNKNOWN),
        entry(FileMode::TREE, "c", Oid::EMPTY_TREE),
        entry(FileMode::EXEC, "d", Oid::UNKNOWN),
    ];
    let buf = encode(&entries);

    let mut iter = RawTreeEntryIter::new(&buf);
    assert_eq!(iter.next()?.as_ref(), Some(&entries[0]));
    assert_eq!(iter.next_back()?.as_ref(), Some(&entries[3]));
    assert_eq!(iter.next()?.as_ref(), Some(&entries[1]));
    assert_eq!(iter.next_back()?.as_ref(), Some(&entries[2]));
    assert_eq!(iter.next()?, None);
    assert_eq!(iter.next_back()?, None);
    Ok(())
}
