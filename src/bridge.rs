//! Query-language adapter: decoded nodes as polymorphic values.
//!
//! Every node of a completed [`Tree`] satisfies the query engine's value
//! contract through a borrowed [`DecodeValue`] handle: key lookup, indexing,
//! iteration, conversion to plain values, and the reserved `_`-prefixed
//! extended keys that surface decoder metadata. The bridge is strictly
//! read-only; updates answer [`Error::NotUpdateable`].

use crate::bits::{BitBuffer, BitRange, BitsFormat, BufferRange};
use crate::error::{Error, FormatError, Result};
use crate::tree::{Actual, NodeId, NodeKind, PathSeg, Tree};
use crate::value::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    pub bits_format: BitsFormat,
}

/// A value as handed to the query engine: a plain value, a decoded node, or
/// a byte/bit-range handle.
#[derive(Debug, Clone)]
pub enum QValue<'t> {
    Plain(Value),
    Node(DecodeValue<'t>),
    Range(BufferRange),
}

impl<'t> QValue<'t> {
    pub fn plain(self) -> Option<Value> {
        match self {
            QValue::Plain(v) => Some(v),
            _ => None,
        }
    }

    pub fn node(self) -> Option<DecodeValue<'t>> {
        match self {
            QValue::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn range(self) -> Option<BufferRange> {
        match self {
            QValue::Range(r) => Some(r),
            _ => None,
        }
    }
}

/// Extended keys every decoded value answers.
const EXT_KEYS: [&str; 15] = [
    "_start",
    "_stop",
    "_len",
    "_name",
    "_root",
    "_buffer_root",
    "_format_root",
    "_parent",
    "_actual",
    "_sym",
    "_description",
    "_path",
    "_bits",
    "_bytes",
    "_unknown",
];

/// Additional extended keys answered by compounds.
const COMPOUND_EXT_KEYS: [&str; 2] = ["_error", "_format"];

/// Borrowed handle exposing one decoded node to the query engine.
#[derive(Debug, Clone, Copy)]
pub struct DecodeValue<'t> {
    tree: &'t Tree,
    id: NodeId,
}

impl<'t> DecodeValue<'t> {
    pub fn new(tree: &'t Tree, id: NodeId) -> Self {
        DecodeValue { tree, id }
    }

    /// Handle on the tree root.
    pub fn root(tree: &'t Tree) -> Self {
        DecodeValue { tree, id: tree.root() }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node(&self) -> &'t crate::tree::Node {
        self.tree.node(self.id)
    }

    pub fn is_array(&self) -> bool {
        matches!(&self.node().kind, NodeKind::Compound(c) if c.is_array)
    }

    /// Child count; not applicable to scalars.
    pub fn length(&self) -> Option<usize> {
        match &self.node().kind {
            NodeKind::Compound(c) => Some(c.children.len()),
            NodeKind::Scalar(_) => None,
        }
    }

    /// The extended keys this node answers.
    pub fn ext_keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = EXT_KEYS.to_vec();
        if self.node().is_compound() {
            keys.extend(COMPOUND_EXT_KEYS);
        }
        keys
    }

    /// The reserved-key table. Absent entries answer `Null`; a `_`-prefixed
    /// key outside the table answers [`Error::ExpectedExtkey`], which a query
    /// can observe and recover from.
    pub fn ext_key(&self, name: &str) -> Result<QValue<'t>> {
        let node = self.node();
        Ok(match name {
            "_start" => QValue::Plain(Value::big(node.range.start)),
            "_stop" => QValue::Plain(Value::big(node.range.stop())),
            "_len" => QValue::Plain(Value::big(node.range.len)),
            "_name" => QValue::Plain(Value::Str(node.name.clone())),
            "_root" => QValue::Node(DecodeValue::new(self.tree, self.tree.tree_root(self.id))),
            "_buffer_root" => {
                QValue::Node(DecodeValue::new(self.tree, self.tree.buffer_root(self.id)))
            }
            "_format_root" => {
                QValue::Node(DecodeValue::new(self.tree, self.tree.format_root(self.id)))
            }
            "_parent" => match self.tree.parent(self.id) {
                Some(p) => QValue::Node(DecodeValue::new(self.tree, p)),
                None => QValue::Plain(Value::Null),
            },
            "_actual" => match &node.kind {
                NodeKind::Scalar(s) => self.actual_qvalue(&s.actual),
                NodeKind::Compound(_) => QValue::Plain(Value::Null),
            },
            "_sym" => match &node.kind {
                NodeKind::Scalar(s) => match &s.sym {
                    Some(sym) => self.actual_qvalue(sym),
                    None => QValue::Plain(Value::Null),
                },
                NodeKind::Compound(_) => QValue::Plain(Value::Null),
            },
            "_description" => {
                let d = match &node.kind {
                    NodeKind::Compound(c) => &c.description,
                    NodeKind::Scalar(s) => &s.description,
                };
                if d.is_empty() {
                    QValue::Plain(Value::Null)
                } else {
                    QValue::Plain(Value::Str(d.clone()))
                }
            }
            "_path" => QValue::Plain(Value::Array(
                self.tree
                    .path(self.id)
                    .into_iter()
                    .map(|seg| match seg {
                        PathSeg::Name(n) => Value::Str(n),
                        PathSeg::Index(i) => Value::Int(i as i64),
                    })
                    .collect(),
            )),
            "_bits" => QValue::Range(BufferRange {
                buf: self.tree.buffer_of(self.id).clone(),
                range: node.range,
                unit: 1,
            }),
            "_bytes" => QValue::Range(BufferRange {
                buf: self.tree.buffer_of(self.id).clone(),
                range: node.range,
                unit: 8,
            }),
            "_error" => match &node.kind {
                NodeKind::Compound(c) => match &c.err {
                    Some(err) => QValue::Plain(error_value(err)),
                    None => QValue::Plain(Value::Null),
                },
                NodeKind::Scalar(_) => QValue::Plain(Value::Null),
            },
            "_format" => match &node.kind {
                NodeKind::Compound(c) => match &c.format {
                    Some(f) => QValue::Plain(Value::Str(f.clone())),
                    None => QValue::Plain(Value::Null),
                },
                NodeKind::Scalar(s) => match &s.actual {
                    Actual::Map(_) | Actual::Seq(_) => QValue::Plain(Value::Str("json".to_string())),
                    _ => QValue::Plain(Value::Null),
                },
            },
            "_unknown" => match &node.kind {
                NodeKind::Scalar(s) => QValue::Plain(Value::Bool(s.unknown)),
                NodeKind::Compound(_) => QValue::Plain(Value::Bool(false)),
            },
            _ => return Err(Error::ExpectedExtkey(name.to_string())),
        })
    }

    /// Key lookup: `_`-prefixed keys bypass child lookup; struct children are
    /// found by name; arrays and scalars have no other string keys. Absent is
    /// `None`, never an error.
    pub fn key(&self, name: &str) -> Result<Option<QValue<'t>>> {
        if name.starts_with('_') {
            return self.ext_key(name).map(Some);
        }
        match &self.node().kind {
            NodeKind::Compound(c) if !c.is_array => Ok(self
                .tree
                .child_by_name(self.id, name)
                .map(|id| QValue::Node(DecodeValue::new(self.tree, id)))),
            _ => Ok(None),
        }
    }

    /// Array element by 0-based index; negative indices are absent.
    pub fn index(&self, i: i64) -> Option<QValue<'t>> {
        match &self.node().kind {
            NodeKind::Compound(c) if c.is_array => {
                if i < 0 {
                    return None;
                }
                c.children
                    .get(i as usize)
                    .map(|&id| QValue::Node(DecodeValue::new(self.tree, id)))
            }
            _ => None,
        }
    }

    /// Array sub-sequence as a plain vector of values.
    pub fn slice(&self, start: usize, end: usize) -> Option<Vec<QValue<'t>>> {
        match &self.node().kind {
            NodeKind::Compound(c) if c.is_array => {
                let end = end.min(c.children.len());
                let start = start.min(end);
                Some(
                    c.children[start..end]
                        .iter()
                        .map(|&id| QValue::Node(DecodeValue::new(self.tree, id)))
                        .collect(),
                )
            }
            _ => None,
        }
    }

    /// `(name, child)` pairs for structs, `(index, child)` for arrays.
    pub fn each(&self) -> Option<Vec<(Value, QValue<'t>)>> {
        match &self.node().kind {
            NodeKind::Compound(c) => Some(
                c.children
                    .iter()
                    .enumerate()
                    .map(|(i, &id)| {
                        let key = if c.is_array {
                            Value::Int(i as i64)
                        } else {
                            Value::Str(self.tree.node(id).name.clone())
                        };
                        (key, QValue::Node(DecodeValue::new(self.tree, id)))
                    })
                    .collect(),
            ),
            NodeKind::Scalar(_) => None,
        }
    }

    /// Child names for structs, `[0..length)` for arrays.
    pub fn keys(&self) -> Option<Vec<Value>> {
        match &self.node().kind {
            NodeKind::Compound(c) => Some(
                c.children
                    .iter()
                    .enumerate()
                    .map(|(i, &id)| {
                        if c.is_array {
                            Value::Int(i as i64)
                        } else {
                            Value::Str(self.tree.node(id).name.clone())
                        }
                    })
                    .collect(),
            ),
            NodeKind::Scalar(_) => None,
        }
    }

    /// Membership test. A known `_` key is always present; an unknown `_` key
    /// is the recoverable [`Error::ExpectedExtkey`].
    pub fn has(&self, key: &Value) -> Result<bool> {
        if let Value::Str(s) = key {
            if s.starts_with('_') {
                self.ext_key(s)?;
                return Ok(true);
            }
        }
        Ok(match &self.node().kind {
            NodeKind::Compound(c) if !c.is_array => match key {
                Value::Str(s) => self.tree.child_by_name(self.id, s).is_some(),
                _ => false,
            },
            NodeKind::Compound(c) => match key.as_i64() {
                Some(i) => i >= 0 && (i as usize) < c.children.len(),
                None => false,
            },
            NodeKind::Scalar(_) => false,
        })
    }

    /// The tree is read-only through the bridge; every update answers
    /// [`Error::NotUpdateable`] and leaves the tree unchanged.
    pub fn update(&self, key: impl Into<String>) -> Error {
        let typ = match &self.node().kind {
            NodeKind::Compound(c) if c.is_array => "array",
            NodeKind::Compound(_) => "object",
            NodeKind::Scalar(_) => "scalar",
        };
        Error::NotUpdateable { typ, key: key.into() }
    }

    /// Lossless conversion to a plain value: structs to objects, arrays to
    /// sequences, scalars promoted per the options (bit slices through the
    /// bit-format function, byte sequences as range handles, never strings).
    pub fn to_plain(&self, opts: &BridgeOptions) -> Result<Value> {
        match &self.node().kind {
            NodeKind::Compound(c) if !c.is_array => {
                let mut m = HashMap::with_capacity(c.children.len());
                for &ch in &c.children {
                    let child = DecodeValue::new(self.tree, ch);
                    m.insert(self.tree.node(ch).name.clone(), child.to_plain(opts)?);
                }
                Ok(Value::Object(m))
            }
            NodeKind::Compound(c) => {
                let mut v = Vec::with_capacity(c.children.len());
                for &ch in &c.children {
                    v.push(DecodeValue::new(self.tree, ch).to_plain(opts)?);
                }
                Ok(Value::Array(v))
            }
            NodeKind::Scalar(s) => self.plain_scalar(&s.actual, opts),
        }
    }

    fn plain_scalar(&self, actual: &Actual, opts: &BridgeOptions) -> Result<Value> {
        Ok(match actual {
            Actual::Bool(b) => Value::Bool(*b),
            Actual::Uint(v) => Value::from_u64(*v),
            Actual::Sint(v) => Value::Int(*v),
            Actual::Big(v) => Value::BigInt(v.clone()),
            Actual::Float(v) => Value::Float(*v),
            Actual::Str(s) => Value::Str(s.clone()),
            Actual::Bits(r) => {
                let br = BufferRange {
                    buf: self.tree.buffer_of(self.id).clone(),
                    range: *r,
                    unit: 1,
                };
                Value::Str(br.render(opts.bits_format)?)
            }
            Actual::Bytes(b) => Value::Range(bytes_handle(b)),
            Actual::Map(m) => Value::Object(m.clone()),
            Actual::Seq(v) => Value::Array(v.clone()),
        })
    }

    fn actual_qvalue(&self, actual: &Actual) -> QValue<'t> {
        match actual {
            Actual::Bool(b) => QValue::Plain(Value::Bool(*b)),
            Actual::Uint(v) => QValue::Plain(Value::from_u64(*v)),
            Actual::Sint(v) => QValue::Plain(Value::Int(*v)),
            Actual::Big(v) => QValue::Plain(Value::BigInt(v.clone())),
            Actual::Float(v) => QValue::Plain(Value::Float(*v)),
            Actual::Str(s) => QValue::Plain(Value::Str(s.clone())),
            Actual::Bits(r) => QValue::Range(BufferRange {
                buf: self.tree.buffer_of(self.id).clone(),
                range: *r,
                unit: 1,
            }),
            Actual::Bytes(b) => QValue::Range(bytes_handle(b)),
            Actual::Map(m) => QValue::Plain(Value::Object(m.clone())),
            Actual::Seq(v) => QValue::Plain(Value::Array(v.clone())),
        }
    }
}

/// Handle over a synthesized byte sequence: its own 8-bit-unit buffer with
/// no source range.
fn bytes_handle(b: &[u8]) -> BufferRange {
    let len = b.len() as u64 * 8;
    BufferRange {
        buf: BitBuffer::from_bytes(b.to_vec()),
        range: BitRange::new(0, len),
        unit: 8,
    }
}

/// Error as a query value: one object per format attempt.
fn error_value(err: &Error) -> Value {
    match err {
        Error::Format(fe) => format_error_value(fe),
        Error::Formats(fs) => Value::Array(fs.errs.iter().map(format_error_value).collect()),
        other => Value::Str(other.to_string()),
    }
}

fn format_error_value(fe: &FormatError) -> Value {
    let mut m = HashMap::new();
    m.insert("format".to_string(), Value::Str(fe.format.clone()));
    m.insert("pos".to_string(), Value::big(fe.pos));
    m.insert("message".to_string(), Value::Str(fe.message.clone()));
    Value::Object(m)
}
