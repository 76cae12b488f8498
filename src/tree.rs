//! The decoded value tree.
//!
//! Nodes live in a per-decode arena owned by [`Tree`] and reference each other
//! by [`NodeId`], so parent/root back-references never form ownership cycles.
//! A completed tree is immutable; the query bridge only reads it.

use crate::bits::{BitBuffer, BitRange};
use crate::error::Error;
use crate::value::Value;
use num_bigint::BigInt;
use std::collections::HashMap;

/// Index of a node in its [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// Index of a bit buffer in the tree's buffer table. Buffer 0 is the root bit
/// buffer; further entries come from sub-buffer re-rooting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufId(pub(crate) u32);

/// Raw decoded value of a scalar leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Actual {
    Bool(bool),
    Uint(u64),
    Sint(i64),
    /// Integers that do not fit 64 bits.
    Big(BigInt),
    Float(f64),
    Str(String),
    /// Bit slice of the node's buffer; no copy is made.
    Bits(BitRange),
    /// Synthesized byte sequence with no source range.
    Bytes(Vec<u8>),
    /// Nested plain mapping.
    Map(HashMap<String, Value>),
    /// Nested plain sequence.
    Seq(Vec<Value>),
}

/// Scalar leaf payload: the raw value plus its decoration.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub actual: Actual,
    /// Symbolic interpretation (enum name, translated value).
    pub sym: Option<Actual>,
    pub description: String,
    /// Set on gap-fill children occupying bits no format explained.
    pub unknown: bool,
}

impl Scalar {
    pub fn new(actual: Actual) -> Self {
        Scalar { actual, sym: None, description: String::new(), unknown: false }
    }

    pub fn with_sym(mut self, sym: Actual) -> Self {
        self.sym = Some(sym);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Struct or array payload.
#[derive(Debug, PartialEq)]
pub struct Compound {
    pub is_array: bool,
    pub children: Vec<NodeId>,
    pub description: String,
    /// Decode error pinned on this compound (scalar failures promote here).
    pub err: Option<Error>,
    /// Name of the format that produced this compound, when dispatched.
    pub format: Option<String>,
    /// Consumed sub-range when a length-scoped sub-decode used fewer bits
    /// than its window; `None` when it coincides with `range`.
    pub(crate) inner: Option<BitRange>,
}

impl Compound {
    fn new(is_array: bool) -> Self {
        Compound {
            is_array,
            children: Vec::new(),
            description: String::new(),
            err: None,
            format: None,
            inner: None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum NodeKind {
    Compound(Compound),
    Scalar(Scalar),
}

/// One decoded node: a named, ranged compound or scalar.
#[derive(Debug, PartialEq)]
pub struct Node {
    pub name: String,
    pub range: BitRange,
    pub buf: BufId,
    pub(crate) parent: Option<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_compound(&self) -> bool {
        matches!(self.kind, NodeKind::Compound(_))
    }

    pub fn compound(&self) -> Option<&Compound> {
        match &self.kind {
            NodeKind::Compound(c) => Some(c),
            NodeKind::Scalar(_) => None,
        }
    }

    pub fn scalar(&self) -> Option<&Scalar> {
        match &self.kind {
            NodeKind::Scalar(s) => Some(s),
            NodeKind::Compound(_) => None,
        }
    }
}

/// One segment of a node's path from the root.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    /// Struct member name.
    Name(String),
    /// Array element index.
    Index(usize),
}

/// Arena holding one decode run's nodes and bit buffers.
#[derive(Debug, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    buffers: Vec<BitBuffer>,
}

impl Tree {
    pub(crate) fn new(root_buf: BitBuffer) -> Self {
        Tree { nodes: Vec::new(), buffers: vec![root_buf] }
    }

    /// The tree root. Only valid once the decode run has created it.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Error pinned on the root compound by a forced decode, if any.
    pub fn root_error(&self) -> Option<&Error> {
        match &self.node(self.root()).kind {
            NodeKind::Compound(c) => c.err.as_ref(),
            NodeKind::Scalar(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// All node ids in arena order (parents precede their children).
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn buffer(&self, id: BufId) -> &BitBuffer {
        &self.buffers[id.0 as usize]
    }

    /// Bit buffer the given node was decoded on.
    pub fn buffer_of(&self, id: NodeId) -> &BitBuffer {
        self.buffer(self.node(id).buf)
    }

    pub(crate) fn push_buffer(&mut self, buf: BitBuffer) -> BufId {
        self.buffers.push(buf);
        BufId((self.buffers.len() - 1) as u32)
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId((self.nodes.len() - 1) as u32)
    }

    pub(crate) fn new_compound(
        &mut self,
        name: impl Into<String>,
        is_array: bool,
        range: BitRange,
        buf: BufId,
        parent: Option<NodeId>,
    ) -> NodeId {
        self.push(Node {
            name: name.into(),
            range,
            buf,
            parent,
            kind: NodeKind::Compound(Compound::new(is_array)),
        })
    }

    pub(crate) fn new_scalar(
        &mut self,
        name: impl Into<String>,
        range: BitRange,
        buf: BufId,
        parent: Option<NodeId>,
        scalar: Scalar,
    ) -> NodeId {
        self.push(Node {
            name: name.into(),
            range,
            buf,
            parent,
            kind: NodeKind::Scalar(scalar),
        })
    }

    /// Discards nodes from `len` on. Used by candidate rollback; callers must
    /// also drop the corresponding child ids from the enclosing compound.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    pub(crate) fn compound_mut(&mut self, id: NodeId) -> &mut Compound {
        match &mut self.node_mut(id).kind {
            NodeKind::Compound(c) => c,
            NodeKind::Scalar(_) => unreachable!("current node is always a compound"),
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Compound(c) => &c.children,
            NodeKind::Scalar(_) => &[],
        }
    }

    pub fn child_by_name(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.node(c).name == name)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Top of the tree reached by walking `parent` links.
    pub fn tree_root(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        while let Some(p) = self.node(cur).parent {
            cur = p;
        }
        cur
    }

    /// Topmost ancestor (or self) decoded on the same bit buffer as `id`:
    /// the point where a sub-decode re-rooted onto a distinct buffer.
    pub fn buffer_root(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        while let Some(p) = self.node(cur).parent {
            if self.node(p).buf != self.node(cur).buf {
                break;
            }
            cur = p;
        }
        cur
    }

    /// Nearest ancestor (or self) produced by a named format; the tree root
    /// when no ancestor was.
    pub fn format_root(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        loop {
            if let NodeKind::Compound(c) = &self.node(cur).kind {
                if c.format.is_some() {
                    return cur;
                }
            }
            match self.node(cur).parent {
                Some(p) => cur = p,
                None => return cur,
            }
        }
    }

    /// Name/index segments from the root down to `id`. Empty at the root.
    pub fn path(&self, id: NodeId) -> Vec<PathSeg> {
        let mut segs = Vec::new();
        let mut cur = id;
        while let Some(p) = self.node(cur).parent {
            let seg = match &self.node(p).kind {
                NodeKind::Compound(c) if c.is_array => {
                    let i = c
                        .children
                        .iter()
                        .position(|&ch| ch == cur)
                        .expect("child is listed in its parent");
                    PathSeg::Index(i)
                }
                _ => PathSeg::Name(self.node(cur).name.clone()),
            };
            segs.push(seg);
            cur = p;
        }
        segs.reverse();
        segs
    }

    /// The node's own semantic range: the consumed sub-range when a
    /// length-scoped sub-decode used fewer bits than its window, else `range`.
    pub fn inner_range(&self, id: NodeId) -> BitRange {
        match &self.node(id).kind {
            NodeKind::Compound(c) => c.inner.unwrap_or(self.node(id).range),
            NodeKind::Scalar(_) => self.node(id).range,
        }
    }
}
