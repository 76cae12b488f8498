//! End-to-end decode scenarios: access-unit splitting, dispatch fallback,
//! gap fill, force mode, cancellation, and tree invariants.

use bitprobe::{
    decode, formats, Actual, BitBuffer, BitRange, CancelToken, DecodeValue, Decoder, Error,
    Format, NodeId, NodeKind, Options, Registry, Scalar, Tree, Value,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// Two length-prefixed NAL units: 5 bytes then 2 bytes.
const AU_BYTES: &[u8] = &[
    0x00, 0x00, 0x00, 0x05, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x00, 0x00, 0x00, 0x02, 0xff, 0x01,
];

fn avc_registry() -> Registry {
    let mut r = Registry::new();
    formats::register_all(&mut r).unwrap();
    r.seal().unwrap();
    r
}

fn avc_in_arg() -> Value {
    let mut m = HashMap::new();
    m.insert("length_size".to_string(), Value::Int(4));
    Value::Object(m)
}

fn decode_au(bytes: &[u8]) -> Tree {
    let registry = avc_registry();
    decode(
        BitBuffer::from_bytes(bytes.to_vec()),
        "avc_au",
        &registry,
        Options { format_options: avc_in_arg(), ..Options::default() },
    )
    .unwrap()
}

fn scalar_uint(tree: &Tree, id: NodeId) -> u64 {
    match &tree.node(id).kind {
        NodeKind::Scalar(s) => match &s.actual {
            Actual::Uint(v) => *v,
            other => panic!("expected uint actual, got {:?}", other),
        },
        NodeKind::Compound(_) => panic!("expected scalar"),
    }
}

#[test]
fn test_avc_au_split() {
    let tree = decode_au(AU_BYTES);
    let root = DecodeValue::root(&tree);
    assert!(root.is_array());
    assert_eq!(root.node().name, "access_unit");
    assert_eq!(root.length(), Some(2));
    assert_eq!(root.node().range, BitRange::new(0, 120));

    let first = root.index(0).unwrap().node().unwrap();
    assert_eq!(first.node().name, "nalu");
    assert!(!first.is_array());
    let length = tree.child_by_name(first.id(), "length").unwrap();
    assert_eq!(tree.node(length).range, BitRange::new(0, 32));
    assert_eq!(scalar_uint(&tree, length), 5);
    let nalu = tree.child_by_name(first.id(), "nalu").unwrap();
    assert_eq!(tree.node(nalu).range, BitRange::new(32, 40));
    assert_eq!(
        tree.node(nalu).compound().unwrap().format.as_deref(),
        Some("avc_nalu")
    );

    let second = root.index(1).unwrap().node().unwrap();
    let length = tree.child_by_name(second.id(), "length").unwrap();
    assert_eq!(tree.node(length).range, BitRange::new(72, 32));
    assert_eq!(scalar_uint(&tree, length), 2);
    let nalu = tree.child_by_name(second.id(), "nalu").unwrap();
    assert_eq!(tree.node(nalu).range, BitRange::new(104, 16));
}

#[test]
fn test_avc_nalu_header_fields() {
    let tree = decode_au(AU_BYTES);
    let root = DecodeValue::root(&tree);
    let first = root.index(0).unwrap().node().unwrap();
    let nalu = tree.child_by_name(first.id(), "nalu").unwrap();

    // 0xaa = 1 01 01010: forbidden=1, ref_idc=1, type=10
    let typ = tree.child_by_name(nalu, "nal_unit_type").unwrap();
    assert_eq!(tree.node(typ).range, BitRange::new(35, 5));
    assert_eq!(scalar_uint(&tree, typ), 10);
    let sym = tree.node(typ).scalar().unwrap().sym.clone();
    assert_eq!(sym, Some(Actual::Str("end_of_sequence".to_string())));

    let data = tree.child_by_name(nalu, "data").unwrap();
    assert_eq!(tree.node(data).range, BitRange::new(40, 32));
}

fn gappy_decode(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_u("field1", 8)?;
    d.seek_rel(8)?;
    d.field_u("field2", 16)?;
    Ok(())
}

#[test]
fn test_gap_fill_inserts_unknown() {
    let mut registry = Registry::new();
    registry
        .register(Format::new("gappy", "", gappy_decode))
        .unwrap();
    registry.seal().unwrap();
    let tree = decode(
        BitBuffer::from_bytes(vec![0x11, 0x22, 0x33, 0x44]),
        "gappy",
        &registry,
        Options::default(),
    )
    .unwrap();

    let root = tree.root();
    let kids = tree.children(root);
    assert_eq!(kids.len(), 3);
    let names: Vec<&str> = kids.iter().map(|&c| tree.node(c).name.as_str()).collect();
    assert_eq!(names, ["field1", "unknown0", "field2"]);
    assert_eq!(tree.node(kids[1]).range, BitRange::new(8, 8));
    let gap = tree.node(kids[1]).scalar().unwrap();
    assert!(gap.unknown);
    assert_eq!(gap.actual, Actual::Bits(BitRange::new(8, 8)));

    // with fill_gaps off the hole stays
    let tree = decode(
        BitBuffer::from_bytes(vec![0x11, 0x22, 0x33, 0x44]),
        "gappy",
        &registry,
        Options { fill_gaps: false, ..Options::default() },
    )
    .unwrap();
    assert_eq!(tree.children(tree.root()).len(), 2);
}

fn failing_a(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_u("x", 16)?;
    Err(d.fatal("giving up"))
}

fn succeeding_b(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_u("y", 32)?;
    Ok(())
}

fn outer_dispatch(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    let group = d.format_group("payload_any")?;
    d.field_format_len("payload", 64, &group, None)?;
    Ok(())
}

fn outer_unscoped(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    let group = d.format_group("payload_any")?;
    d.field_format("payload", &group, None)?;
    d.field_u("after", 8)?;
    Ok(())
}

fn dispatch_registry() -> Registry {
    let mut r = Registry::new();
    r.register(Format::new("a", "always fails", failing_a)).unwrap();
    r.register(Format::new("b", "always works", succeeding_b)).unwrap();
    r.register_group("payload_any", &["a", "b"]).unwrap();
    r.register(Format::new("outer", "", outer_dispatch).dependency(&["payload_any"]))
        .unwrap();
    r.register(Format::new("outer_unscoped", "", outer_unscoped).dependency(&["payload_any"]))
        .unwrap();
    r.seal().unwrap();
    r
}

#[test]
fn test_dispatch_fallback_discards_partial_reads() {
    let registry = dispatch_registry();
    let tree = decode(
        BitBuffer::from_bytes(vec![0u8; 8]),
        "outer",
        &registry,
        Options::default(),
    )
    .unwrap();

    let payload = tree.child_by_name(tree.root(), "payload").unwrap();
    let node = tree.node(payload);
    assert_eq!(node.range, BitRange::new(0, 64));
    let c = node.compound().unwrap();
    assert_eq!(c.format.as_deref(), Some("b"));
    assert!(c.err.is_none());

    // no remnants of a's partial "x"; b's "y" plus the trailing gap
    assert!(tree.child_by_name(payload, "x").is_none());
    let names: Vec<&str> = tree
        .children(payload)
        .iter()
        .map(|&c| tree.node(c).name.as_str())
        .collect();
    assert_eq!(names, ["y", "unknown0"]);
    assert_eq!(tree.inner_range(payload), BitRange::new(0, 32));
    assert_eq!(tree.node(tree.children(payload)[1]).range, BitRange::new(32, 32));
}

#[test]
fn test_unscoped_dispatch_advances_by_consumed_bits() {
    let registry = dispatch_registry();
    let tree = decode(
        BitBuffer::from_bytes(vec![0u8; 5]),
        "outer_unscoped",
        &registry,
        Options::default(),
    )
    .unwrap();

    // no length window: the compound covers exactly what "b" consumed and
    // the outer position resumes right after it
    let payload = tree.child_by_name(tree.root(), "payload").unwrap();
    assert_eq!(tree.node(payload).range, BitRange::new(0, 32));
    assert_eq!(tree.inner_range(payload), BitRange::new(0, 32));
    assert_eq!(
        tree.node(payload).compound().unwrap().format.as_deref(),
        Some("b")
    );
    assert!(tree.child_by_name(payload, "x").is_none());
    let after = tree.child_by_name(tree.root(), "after").unwrap();
    assert_eq!(tree.node(after).range, BitRange::new(32, 8));
}

fn all_fail_outer(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    let group = d.format_group("a")?;
    d.field_format_len("payload", 32, &group, None)?;
    d.field_u("after", 8)?;
    Ok(())
}

#[test]
fn test_dispatch_all_fail_contains_error_and_advances() {
    let mut registry = Registry::new();
    registry.register(Format::new("a", "", failing_a)).unwrap();
    registry.register(Format::new("outer", "", all_fail_outer)).unwrap();
    registry.seal().unwrap();

    let tree = decode(
        BitBuffer::from_bytes(vec![0u8; 5]),
        "outer",
        &registry,
        Options { fill_gaps: false, ..Options::default() },
    )
    .unwrap();

    let payload = tree.child_by_name(tree.root(), "payload").unwrap();
    let c = tree.node(payload).compound().unwrap();
    assert!(c.children.is_empty());
    match &c.err {
        Some(Error::Formats(fs)) => {
            assert_eq!(fs.errs.len(), 1);
            assert_eq!(fs.errs[0].format, "a");
        }
        other => panic!("expected FormatsError, got {:?}", other),
    }
    // position advanced past the window: "after" sits at bit 32
    let after = tree.child_by_name(tree.root(), "after").unwrap();
    assert_eq!(tree.node(after).range, BitRange::new(32, 8));
}

fn needy(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_u("a", 32)?;
    d.field_u("b", 32)?;
    d.field_u("c", 32)?;
    Ok(())
}

#[test]
fn test_force_mode() {
    let mut registry = Registry::new();
    registry.register(Format::new("needy", "", needy)).unwrap();
    registry.seal().unwrap();
    let bytes = vec![0xabu8; 6]; // room for "a" only

    // force=false: no tree, aggregate error
    let err = decode(
        BitBuffer::from_bytes(bytes.clone()),
        "needy",
        &registry,
        Options::default(),
    )
    .unwrap_err();
    match err {
        Error::Formats(fs) => {
            assert_eq!(fs.errs.len(), 1);
            assert_eq!(fs.errs[0].format, "needy");
        }
        other => panic!("expected FormatsError, got {:?}", other),
    }

    // force=true: partial tree, error pinned on the root, siblings skipped
    let tree = decode(
        BitBuffer::from_bytes(bytes),
        "needy",
        &registry,
        Options { force: true, ..Options::default() },
    )
    .unwrap();
    let root = tree.root();
    assert!(tree.root_error().is_some());
    assert!(tree.child_by_name(root, "a").is_some());
    assert!(tree.child_by_name(root, "b").is_none());
    assert!(tree.child_by_name(root, "c").is_none());
    // the undecoded tail is an unknown gap
    let names: Vec<&str> = tree
        .children(root)
        .iter()
        .map(|&c| tree.node(c).name.as_str())
        .collect();
    assert_eq!(names, ["a", "unknown0"]);
    assert_eq!(tree.node(tree.children(root)[1]).range, BitRange::new(32, 16));
}

fn colliding(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_u("twice", 8)?;
    d.field_u("twice", 8)?;
    Ok(())
}

#[test]
fn test_duplicate_struct_name_is_fatal() {
    let mut registry = Registry::new();
    registry.register(Format::new("colliding", "", colliding)).unwrap();
    registry.seal().unwrap();
    let err = decode(
        BitBuffer::from_bytes(vec![0u8; 4]),
        "colliding",
        &registry,
        Options::default(),
    )
    .unwrap_err();
    match err {
        Error::Formats(fs) => assert!(fs.errs[0].message.contains("duplicate field name")),
        other => panic!("expected FormatsError, got {:?}", other),
    }
}

fn synthetic(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_u("payload", 16)?;
    d.field_value("crc_ok", Scalar::new(Actual::Bool(true)))?;
    Ok(())
}

#[test]
fn test_synthetic_field_is_zero_length_and_gap_exempt() {
    let mut registry = Registry::new();
    registry.register(Format::new("synthetic", "", synthetic)).unwrap();
    registry.seal().unwrap();
    let tree = decode(
        BitBuffer::from_bytes(vec![0u8; 2]),
        "synthetic",
        &registry,
        Options::default(),
    )
    .unwrap();
    let crc = tree.child_by_name(tree.root(), "crc_ok").unwrap();
    assert_eq!(tree.node(crc).range, BitRange::new(16, 0));
    // no unknown child was inserted for the zero-length synthetic
    assert_eq!(tree.children(tree.root()).len(), 2);
}

// header up front, checksum pinned to the buffer tail, hole in between
fn framed(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_u("magic", 16)?;
    let body_start = d.pos();
    let trailer_start = d.len() - 16;
    d.seek_abs(trailer_start)?;
    d.field_u("crc", 16)?;
    d.field_value("body_bits", Scalar::new(Actual::Uint(trailer_start - body_start)))?;
    Ok(())
}

#[test]
fn test_seek_abs_to_trailer() {
    let mut registry = Registry::new();
    registry.register(Format::new("framed", "", framed)).unwrap();
    registry.seal().unwrap();
    let tree = decode(
        BitBuffer::from_bytes(vec![0x4d, 0x5a, 1, 2, 0xca, 0xfe]),
        "framed",
        &registry,
        Options::default(),
    )
    .unwrap();

    let root = tree.root();
    let names: Vec<&str> = tree
        .children(root)
        .iter()
        .map(|&c| tree.node(c).name.as_str())
        .collect();
    assert_eq!(names, ["magic", "unknown0", "crc", "body_bits"]);
    let crc = tree.child_by_name(root, "crc").unwrap();
    assert_eq!(tree.node(crc).range, BitRange::new(32, 16));
    assert_eq!(scalar_uint(&tree, crc), 0xcafe);
    let body_bits = tree.child_by_name(root, "body_bits").unwrap();
    assert_eq!(scalar_uint(&tree, body_bits), 16);
}

fn typed(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_utf8("tag", 4)?;
    d.field_s("temp", 16)?;
    d.field_f("scale", 32)?;
    Ok(())
}

#[test]
fn test_typed_primitive_fields() {
    let mut registry = Registry::new();
    registry.register(Format::new("typed", "", typed)).unwrap();
    registry.seal().unwrap();
    let mut bytes = b"trak".to_vec();
    bytes.extend_from_slice(&(-2i16).to_be_bytes());
    bytes.extend_from_slice(&0.5f32.to_be_bytes());
    let tree = decode(
        BitBuffer::from_bytes(bytes),
        "typed",
        &registry,
        Options::default(),
    )
    .unwrap();

    let root = tree.root();
    let tag = tree.child_by_name(root, "tag").unwrap();
    assert_eq!(tree.node(tag).range, BitRange::new(0, 32));
    assert_eq!(
        tree.node(tag).scalar().unwrap().actual,
        Actual::Str("trak".to_string())
    );
    let temp = tree.child_by_name(root, "temp").unwrap();
    assert_eq!(tree.node(temp).range, BitRange::new(32, 16));
    assert_eq!(tree.node(temp).scalar().unwrap().actual, Actual::Sint(-2));
    let scale = tree.child_by_name(root, "scale").unwrap();
    assert_eq!(tree.node(scale).range, BitRange::new(48, 32));
    assert_eq!(tree.node(scale).scalar().unwrap().actual, Actual::Float(0.5));

    // invalid utf-8 in a string field is a decode error
    let err = decode(
        BitBuffer::from_bytes(vec![0xff; 10]),
        "typed",
        &registry,
        Options::default(),
    )
    .unwrap_err();
    match err {
        Error::Formats(fs) => assert!(fs.errs[0].message.contains("invalid utf-8")),
        other => panic!("expected FormatsError, got {:?}", other),
    }
}

fn rerooting(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_raw_len("compressed", 16)?;
    // stand-in for decompression output
    let inflated = BitBuffer::from_bytes(vec![0x12, 0x34, 0x56]);
    let group = d.format_group("inner3")?;
    d.field_format_bit_buf("inflated", inflated, &group, None)?;
    Ok(())
}

fn inner3(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    d.field_u("a", 8)?;
    d.field_u("b", 16)?;
    Ok(())
}

#[test]
fn test_sub_buffer_rerooting() {
    let mut registry = Registry::new();
    registry.register(Format::new("inner3", "", inner3)).unwrap();
    registry
        .register(Format::new("rerooting", "", rerooting).dependency(&["inner3"]))
        .unwrap();
    registry.seal().unwrap();
    let tree = decode(
        BitBuffer::from_bytes(vec![0xff, 0xff]),
        "rerooting",
        &registry,
        Options::default(),
    )
    .unwrap();

    let inflated = tree.child_by_name(tree.root(), "inflated").unwrap();
    // ranges are absolute within the new buffer, not the outer one
    assert_eq!(tree.node(inflated).range, BitRange::new(0, 24));
    let a = tree.child_by_name(inflated, "a").unwrap();
    assert_eq!(tree.node(a).range, BitRange::new(0, 8));
    // the re-rooted compound is its own buffer root; the outer field is not
    assert_eq!(tree.buffer_root(a), inflated);
    assert_eq!(tree.buffer_root(inflated), inflated);
    let compressed = tree.child_by_name(tree.root(), "compressed").unwrap();
    assert_eq!(tree.buffer_root(compressed), tree.root());
}

#[test]
fn test_determinism() {
    let t1 = decode_au(AU_BYTES);
    let t2 = decode_au(AU_BYTES);
    assert_eq!(t1, t2);
}

fn check_invariants(tree: &Tree, id: NodeId) {
    let node = tree.node(id);
    if let NodeKind::Compound(c) = &node.kind {
        let mut covered = 0u64;
        let mut prev_start: Option<u64> = None;
        for &ch in &c.children {
            let child = tree.node(ch);
            assert_eq!(tree.parent(ch), Some(id), "parent link of {}", child.name);
            if child.buf == node.buf {
                assert!(
                    node.range.contains(&child.range),
                    "{} [{:?}] outside {} [{:?}]",
                    child.name,
                    child.range,
                    node.name,
                    node.range
                );
                if child.range.len > 0 {
                    if let Some(p) = prev_start {
                        assert!(child.range.start >= p, "children out of order");
                    }
                    prev_start = Some(child.range.start);
                    covered += child.range.len;
                }
            }
            check_invariants(tree, ch);
        }
        // gap fill makes direct children partition the range exactly
        if node.range.len > 0 && !c.children.is_empty() {
            assert_eq!(covered, node.range.len, "children of {} do not partition it", node.name);
        }
    }
}

#[test]
fn test_tree_invariants_hold() {
    let tree = decode_au(AU_BYTES);
    check_invariants(&tree, tree.root());
}

#[test]
fn test_struct_names_unique_within_compounds() {
    let tree = decode_au(AU_BYTES);
    for id in tree.node_ids() {
        if let NodeKind::Compound(c) = &tree.node(id).kind {
            if c.is_array {
                continue;
            }
            let mut names: Vec<&str> =
                c.children.iter().map(|&ch| tree.node(ch).name.as_str()).collect();
            names.sort_unstable();
            let before = names.len();
            names.dedup();
            assert_eq!(before, names.len());
        }
    }
}

#[test]
fn test_cancellation_before_decode() {
    let registry = avc_registry();
    let token = CancelToken::new();
    token.cancel();
    let err = decode(
        BitBuffer::from_bytes(AU_BYTES.to_vec()),
        "avc_au",
        &registry,
        Options { cancel: Some(token), format_options: avc_in_arg(), ..Options::default() },
    )
    .unwrap_err();
    assert!(err.is_canceled());
}

#[test]
fn test_cancellation_mid_decode() {
    let token = CancelToken::new();
    let observer = token.clone();
    let mut registry = Registry::new();
    registry
        .register(Format::new(
            "endless",
            "",
            move |d: &mut Decoder<'_>, _in: &Value| -> bitprobe::Result<()> {
                let mut i = 0u32;
                while d.not_end() {
                    d.field_u(&format!("f{}", i), 8)?;
                    i += 1;
                    observer.cancel();
                }
                Ok(())
            },
        ))
        .unwrap();
    registry.seal().unwrap();
    let err = decode(
        BitBuffer::from_bytes(vec![0u8; 1024]),
        "endless",
        &registry,
        Options { cancel: Some(token), ..Options::default() },
    )
    .unwrap_err();
    // canceled propagates directly, never wrapped into a formats error
    assert!(err.is_canceled());
}

#[test]
fn test_progress_reports_coarse_intervals() {
    let counter = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&counter);
    let mut registry = Registry::new();
    registry
        .register(Format::new(
            "bytes",
            "",
            |d: &mut Decoder<'_>, _in: &Value| -> bitprobe::Result<()> {
                let mut i = 0u32;
                while d.not_end() {
                    d.field_u(&format!("b{}", i), 8)?;
                    i += 1;
                }
                Ok(())
            },
        ))
        .unwrap();
    registry.seal().unwrap();
    let total = 8192u64;
    decode(
        BitBuffer::from_bytes(vec![0u8; total as usize]),
        "bytes",
        &registry,
        Options {
            progress: Some(Box::new(move |read, total_size| {
                assert!(read <= total_size);
                seen.fetch_add(1, Ordering::Relaxed);
            })),
            ..Options::default()
        },
    )
    .unwrap();
    assert!(counter.load(Ordering::Relaxed) >= 1);
}

#[test]
fn test_unknown_root_format() {
    let registry = avc_registry();
    let err = decode(
        BitBuffer::from_bytes(vec![]),
        "no_such_format",
        &registry,
        Options::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownFormat(_)));
}

fn looping(d: &mut Decoder<'_>, _in: &Value) -> bitprobe::Result<()> {
    let mut left = 3u32;
    d.field_struct_array_loop(
        "entries",
        "entry",
        move |_| {
            let go = left > 0;
            left = left.saturating_sub(1);
            go
        },
        |d| {
            d.field_u("v", 8)?;
            Ok(())
        },
    )
}

#[test]
fn test_struct_array_loop() {
    let mut registry = Registry::new();
    registry.register(Format::new("looping", "", looping)).unwrap();
    registry.seal().unwrap();
    let tree = decode(
        BitBuffer::from_bytes(vec![1, 2, 3, 4]),
        "looping",
        &registry,
        Options { fill_gaps: false, ..Options::default() },
    )
    .unwrap();
    let entries = tree.child_by_name(tree.root(), "entries").unwrap();
    let node = tree.node(entries);
    assert!(node.compound().unwrap().is_array);
    assert_eq!(tree.children(entries).len(), 3);
    let v = tree.child_by_name(tree.children(entries)[2], "v").unwrap();
    assert_eq!(scalar_uint(&tree, v), 3);
}

#[test]
fn test_decode_restricted_range() {
    // same AU payload but with 2 junk bytes on either side
    let mut bytes = vec![0xde, 0xad];
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x02, 0xff, 0x01]);
    bytes.extend_from_slice(&[0xbe, 0xef]);
    let registry = avc_registry();
    let tree = decode(
        BitBuffer::from_bytes(bytes),
        "avc_au",
        &registry,
        Options {
            range: Some(BitRange::new(16, 48)),
            format_options: avc_in_arg(),
            ..Options::default()
        },
    )
    .unwrap();
    // positions stay absolute within the buffer
    let root = tree.root();
    assert_eq!(tree.node(root).range, BitRange::new(16, 48));
    let first = tree.children(root)[0];
    let length = tree.child_by_name(first, "length").unwrap();
    assert_eq!(tree.node(length).range, BitRange::new(16, 32));
    assert_eq!(scalar_uint(&tree, length), 2);
}
