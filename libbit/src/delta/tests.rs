use super::*;

#[test]
fn test_parse_delta_insert_op() -> BitResult<()> {
    let op = DeltaOp::deserialize(&mut &[0x3, 0xa, 0xb, 0xc][..])?;
    assert_eq!(op, DeltaOp::Insert(vec![0xa, 0xb, 0xc]));
    Ok(())
}

#[test]
fn test_parse_delta_copy_op() -> BitResult<()> {
    let op =
        DeltaOp::deserialize(&mut &[0b11111111, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd][..])?;
    // little endian encoding
    assert_eq!(op, DeltaOp::Copy(0x67452301, 0xcdab89));
    Ok(())
}

#[test]
fn test_parse_delta_zero_size() -> BitResult<()> {
    let op = DeltaOp::deserialize(&mut &[0x80][..])?;
    assert_eq!(op, DeltaOp::Copy(0, 0x10000));
    Ok(())
}

#[test]
fn test_expand_copy_and_insert() -> BitResult<()> {
    let base = b"the quick brown fox";
    let delta = Delta {
        source_size: base.len() as u64,
        target_size: 14,
        ops: vec![DeltaOp::Copy(4, 9), DeltaOp::Insert(b"jumps".to_vec())],
    };
    assert_eq!(delta.expand(base)?, b"quick brojumps");
    Ok(())
}

#[test]
fn test_expand_rejects_wrong_source_size() {
    let delta = Delta { source_size: 100, target_size: 0, ops: vec![] };
    assert!(delta.expand(b"too short").is_err());
}

#[test]
fn test_expand_copy_out_of_bounds_is_corrupt() {
    let base = b"short";
    let delta = Delta {
        source_size: base.len() as u64,
        target_size: 10,
        ops: vec![DeltaOp::Copy(0, 10)],
    };
    assert!(delta.expand(base).is_err());
}
