//! The decoding kernel: field operations, framing, format dispatch, error
//! containment, and the top-level driver.
//!
//! A [`Decoder`] is the single handle format plugins see. It owns a positioned
//! reader over the root bit buffer, the tree arena being built, and the
//! innermost length scope. Framing is expressed as body closures
//! ([`Decoder::field_struct`] and friends); fatal errors are plain `Err`
//! values propagated with `?`.
//!
//! Candidate dispatch ([`Decoder::field_format_len`]) is all-or-nothing: each
//! attempt snapshots the arena length and the enclosing compound's child
//! count, and a failing candidate is rolled back by truncation before the
//! next one runs.

use crate::bits::{BitBuffer, BitRange};
use crate::error::{Error, FormatError, FormatsError, Result};
use crate::reader::BitReader;
use crate::registry::{Format, FormatGroup, Registry, RootVariant};
use crate::tree::{Actual, BufId, NodeId, NodeKind, Scalar, Tree};
use crate::value::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One progress callback per this many primitive reads.
const PROGRESS_INTERVAL: u64 = 4096;

/// Cooperative cancellation handle shared with a decode run. Observed at the
/// next primitive read or candidate dispatch, never asynchronously.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress callback: `(approx_read_bytes, total_size_bytes)`. Runs
/// synchronously on the decoding task; must not block.
pub type ProgressFn = Box<dyn FnMut(u64, u64)>;

/// Top-level decode options.
pub struct Options {
    /// Keep the partial tree when the root format fails, with the error
    /// pinned on the root compound.
    pub force: bool,
    /// Insert `unknown` scalars so every compound's children partition its
    /// bit range exactly.
    pub fill_gaps: bool,
    /// Restrict the decode to a sub-range of the buffer. Positions stay
    /// absolute within the buffer.
    pub range: Option<BitRange>,
    /// Lands on the root compound (typically the input's file name).
    pub description: String,
    /// Passed to the root format's decode function; the format's own
    /// `default_in_arg` is used when `Null`.
    pub format_options: Value,
    pub cancel: Option<CancelToken>,
    pub progress: Option<ProgressFn>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            force: false,
            fill_gaps: true,
            range: None,
            description: String::new(),
            format_options: Value::Null,
            cancel: None,
            progress: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("force", &self.force)
            .field("fill_gaps", &self.fill_gaps)
            .field("range", &self.range)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// The central decoding context handed to format plugins.
pub struct Decoder<'r> {
    registry: &'r Registry,
    reader: BitReader,
    tree: Tree,
    /// Compound currently being populated.
    cur: NodeId,
    /// Buffer new nodes are recorded against; switches on re-rooting.
    cur_buf: BufId,
    force: bool,
    cancel: Option<CancelToken>,
    progress: Option<ProgressFn>,
    total_bytes: u64,
    reads: u64,
    /// Names of the formats currently being dispatched, innermost last.
    format_stack: Vec<String>,
}

impl<'r> Decoder<'r> {
    // --- position and scope ---

    pub fn not_end(&self) -> bool {
        !self.reader.at_end()
    }

    /// Current bit position.
    pub fn pos(&self) -> u64 {
        self.reader.pos()
    }

    /// Length of the underlying bit buffer.
    pub fn len(&self) -> u64 {
        self.reader.buffer().len()
    }

    /// Bits left in the innermost length scope.
    pub fn bits_left(&self) -> u64 {
        self.reader.bits_left()
    }

    pub fn seek_rel(&mut self, delta: i64) -> Result<u64> {
        self.reader.seek_rel(delta)
    }

    pub fn seek_abs(&mut self, pos: u64) -> Result<u64> {
        self.reader.seek_abs(pos)
    }

    /// Resolves a format or group name through the registry the run was
    /// started with. Dependency names are validated at registration.
    pub fn format_group(&self, name: &str) -> Result<FormatGroup> {
        self.registry.group(name)
    }

    /// Builds the fatal error that aborts the current decode attempt.
    /// Use as `return Err(d.fatal("reason"))`.
    pub fn fatal(&self, message: impl Into<String>) -> Error {
        Error::Format(FormatError {
            format: self.current_format().to_string(),
            pos: self.reader.pos(),
            message: message.into(),
        })
    }

    /// Formatted variant of [`Decoder::fatal`]:
    /// `return Err(d.errorf(format_args!("bad marker {marker:#x}")))`.
    pub fn errorf(&self, args: fmt::Arguments<'_>) -> Error {
        self.fatal(args.to_string())
    }

    fn current_format(&self) -> &str {
        self.format_stack.last().map(String::as_str).unwrap_or_default()
    }

    /// Sets the free-text description of the compound being populated.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.tree.compound_mut(self.cur).description = description.into();
    }

    // --- plumbing ---

    /// Cancellation and progress checkpoint; hit by every primitive read.
    fn check_point(&mut self) -> Result<()> {
        if let Some(t) = &self.cancel {
            if t.is_canceled() {
                return Err(Error::Canceled);
            }
        }
        self.reads += 1;
        if self.reads % PROGRESS_INTERVAL == 0 {
            if let Some(f) = &mut self.progress {
                f(self.reader.pos() / 8, self.total_bytes);
            }
        }
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if let NodeKind::Compound(c) = &self.tree.node(self.cur).kind {
            if !c.is_array {
                for &ch in &c.children {
                    if self.tree.node(ch).name == name {
                        return Err(Error::NameCollision(name.to_string()));
                    }
                }
            }
        }
        Ok(())
    }

    fn add_scalar(&mut self, name: &str, range: BitRange, scalar: Scalar) -> Result<NodeId> {
        self.check_name(name)?;
        let id = self
            .tree
            .new_scalar(name, range, self.cur_buf, Some(self.cur), scalar);
        self.tree.compound_mut(self.cur).children.push(id);
        Ok(id)
    }

    // --- primitive fields ---

    /// Unsigned integer of `width` bits.
    pub fn field_u(&mut self, name: &str, width: u32) -> Result<u64> {
        self.check_point()?;
        let start = self.reader.pos();
        let v = self.reader.u(width)?;
        self.add_scalar(name, BitRange::new(start, width as u64), Scalar::new(Actual::Uint(v)))?;
        Ok(v)
    }

    /// Unsigned integer with a symbolic interpretation.
    pub fn field_u_sym(
        &mut self,
        name: &str,
        width: u32,
        sym: impl FnOnce(u64) -> Option<&'static str>,
    ) -> Result<u64> {
        self.check_point()?;
        let start = self.reader.pos();
        let v = self.reader.u(width)?;
        let mut scalar = Scalar::new(Actual::Uint(v));
        if let Some(s) = sym(v) {
            scalar.sym = Some(Actual::Str(s.to_string()));
        }
        self.add_scalar(name, BitRange::new(start, width as u64), scalar)?;
        Ok(v)
    }

    /// Signed integer of `width` bits, two's complement.
    pub fn field_s(&mut self, name: &str, width: u32) -> Result<i64> {
        self.check_point()?;
        let start = self.reader.pos();
        let v = self.reader.s(width)?;
        self.add_scalar(name, BitRange::new(start, width as u64), Scalar::new(Actual::Sint(v)))?;
        Ok(v)
    }

    /// Single-bit boolean flag.
    pub fn field_bool(&mut self, name: &str) -> Result<bool> {
        self.check_point()?;
        let start = self.reader.pos();
        let v = self.reader.u(1)? != 0;
        self.add_scalar(name, BitRange::new(start, 1), Scalar::new(Actual::Bool(v)))?;
        Ok(v)
    }

    /// IEEE-754 float of 16, 32 or 64 bits.
    pub fn field_f(&mut self, name: &str, width: u32) -> Result<f64> {
        self.check_point()?;
        let start = self.reader.pos();
        let v = self.reader.f(width)?;
        self.add_scalar(name, BitRange::new(start, width as u64), Scalar::new(Actual::Float(v)))?;
        Ok(v)
    }

    /// UTF-8 string of `byte_len` bytes.
    pub fn field_utf8(&mut self, name: &str, byte_len: u64) -> Result<String> {
        self.check_point()?;
        let start = self.reader.pos();
        let v = self.reader.utf8(byte_len)?;
        self.add_scalar(
            name,
            BitRange::new(start, byte_len * 8),
            Scalar::new(Actual::Str(v.clone())),
        )?;
        Ok(v)
    }

    /// Raw bit slice of `bit_len` bits; no copy, just a range.
    pub fn field_raw_len(&mut self, name: &str, bit_len: u64) -> Result<BitRange> {
        self.check_point()?;
        let r = self.reader.raw(bit_len)?;
        self.add_scalar(name, r, Scalar::new(Actual::Bits(r)))?;
        Ok(r)
    }

    /// Synthetic scalar with a zero-length range at the current position
    /// (derived values: computed checksums, counters). Gap fill ignores it.
    pub fn field_value(&mut self, name: &str, scalar: Scalar) -> Result<NodeId> {
        let pos = self.reader.pos();
        self.add_scalar(name, BitRange::new(pos, 0), scalar)
    }

    // --- framing ---

    /// Decodes `body` into a new struct child named `name`.
    pub fn field_struct<T>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Decoder<'r>) -> Result<T>,
    ) -> Result<T> {
        self.field_compound(name, false, body)
    }

    /// Decodes `body` into a new array child named `name`.
    pub fn field_array<T>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Decoder<'r>) -> Result<T>,
    ) -> Result<T> {
        self.field_compound(name, true, body)
    }

    /// Array of structs: repeats `field_struct(elem_name, body)` while
    /// `cond` holds and input remains.
    pub fn field_struct_array_loop(
        &mut self,
        name: &str,
        elem_name: &str,
        mut cond: impl FnMut(&mut Decoder<'r>) -> bool,
        mut body: impl FnMut(&mut Decoder<'r>) -> Result<()>,
    ) -> Result<()> {
        self.field_array(name, |d| {
            while cond(d) && d.not_end() {
                d.field_struct(elem_name, &mut body)?;
            }
            Ok(())
        })
    }

    fn field_compound<T>(
        &mut self,
        name: &str,
        is_array: bool,
        body: impl FnOnce(&mut Decoder<'r>) -> Result<T>,
    ) -> Result<T> {
        self.check_name(name)?;
        let start = self.reader.pos();
        let id = self.tree.new_compound(
            name,
            is_array,
            BitRange::new(start, 0),
            self.cur_buf,
            Some(self.cur),
        );
        self.tree.compound_mut(self.cur).children.push(id);
        let saved = std::mem::replace(&mut self.cur, id);
        let res = body(self);
        self.cur = saved;
        // range is set even on error so a force-kept partial tree stays sound
        self.finish_compound(id, start);
        res
    }

    /// Sets a compound's range to the envelope of `[start, pos)` and its
    /// same-buffer children (re-rooted children are ranged in their own
    /// buffer and do not count).
    fn finish_compound(&mut self, id: NodeId, start: u64) {
        let buf = self.tree.node(id).buf;
        let mut lo = start;
        let mut hi = self.reader.pos().max(start);
        for ch in self.tree.children(id).to_vec() {
            let node = self.tree.node(ch);
            if node.buf != buf {
                continue;
            }
            lo = lo.min(node.range.start);
            hi = hi.max(node.range.stop());
        }
        self.tree.node_mut(id).range = BitRange::new(lo, hi - lo);
    }

    // --- format dispatch ---

    /// Dispatches into the first matching candidate at the current position
    /// within the current scope; advances by what the winner consumed.
    pub fn field_format(
        &mut self,
        name: &str,
        group: &FormatGroup,
        in_arg: Option<&Value>,
    ) -> Result<Option<NodeId>> {
        let start = self.reader.pos();
        self.dispatch(name, group, in_arg, start, false)
    }

    /// Length-scoped sub-decode: restricts the reader to
    /// `[pos, pos + bit_len)`, tries the candidates in order, and advances to
    /// the window end no matter how many bits the winner consumed. All
    /// candidate failures are contained; only the aggregate lands on the
    /// attached compound's error.
    pub fn field_format_len(
        &mut self,
        name: &str,
        bit_len: u64,
        group: &FormatGroup,
        in_arg: Option<&Value>,
    ) -> Result<Option<NodeId>> {
        let start = self.reader.pos();
        let end = start.checked_add(bit_len).ok_or(Error::Range {
            pos: start,
            wanted: bit_len,
            left: self.reader.bits_left(),
        })?;
        let saved = self.reader.push_limit(end)?;
        let res = self.dispatch(name, group, in_arg, start, true);
        self.reader.restore_limit(saved);
        self.reader.seek_abs(end)?;
        res
    }

    /// Decodes `buf` (typically produced by decompression or descrambling)
    /// as an independent, re-rooted sub-tree. Child ranges are absolute
    /// within `buf`; the outer position does not move.
    pub fn field_format_bit_buf(
        &mut self,
        name: &str,
        buf: BitBuffer,
        group: &FormatGroup,
        in_arg: Option<&Value>,
    ) -> Result<Option<NodeId>> {
        let buf_id = self.tree.push_buffer(buf.clone());
        let saved_reader = std::mem::replace(&mut self.reader, BitReader::new(buf));
        let saved_buf = std::mem::replace(&mut self.cur_buf, buf_id);
        let res = self.dispatch(name, group, in_arg, 0, true);
        self.cur_buf = saved_buf;
        self.reader = saved_reader;
        res
    }

    /// Candidate loop shared by the dispatch entry points. `start` to the
    /// reader's current limit is the window; `window_is_range` makes the
    /// attached compound cover the whole window (length-scoped and re-rooted
    /// decodes) rather than just the consumed bits.
    fn dispatch(
        &mut self,
        name: &str,
        group: &FormatGroup,
        in_arg: Option<&Value>,
        start: u64,
        window_is_range: bool,
    ) -> Result<Option<NodeId>> {
        self.check_name(name)?;
        let window_end = self.reader.limit();
        let parent = self.cur;
        let mut errs: Vec<FormatError> = Vec::new();

        for (i, format) in group.iter().enumerate() {
            if let Some(t) = &self.cancel {
                if t.is_canceled() {
                    return Err(Error::Canceled);
                }
            }
            tracing::trace!(format = %format.name, start, "trying candidate format");
            let nodes_len = self.tree.len();
            let child_count = self.tree.children(parent).len();
            self.reader.seek_abs(start)?;

            let is_array = format.root_variant == RootVariant::Array;
            let id = self.tree.new_compound(
                name,
                is_array,
                BitRange::new(start, 0),
                self.cur_buf,
                Some(parent),
            );
            self.tree.compound_mut(parent).children.push(id);
            let saved_cur = std::mem::replace(&mut self.cur, id);
            self.format_stack.push(format.name.clone());
            let arg = in_arg.unwrap_or(&format.default_in_arg);
            let res = (format.decode_fn)(self, arg);
            self.format_stack.pop();
            self.cur = saved_cur;

            match res {
                Ok(()) => {
                    self.finish_compound(id, start);
                    self.seal_dispatched(id, start, window_end, window_is_range);
                    self.note_format(id, format.as_ref());
                    return Ok(Some(id));
                }
                Err(e) if e.is_canceled() => return Err(e),
                Err(e) => {
                    errs.push(match e {
                        Error::Format(fe) => fe,
                        other => FormatError {
                            format: format.name.clone(),
                            pos: self.reader.pos(),
                            message: other.to_string(),
                        },
                    });
                    if self.force && i + 1 == group.len() {
                        // keep the last candidate's partial children and pin
                        // the aggregate error on the compound
                        self.finish_compound(id, start);
                        self.seal_dispatched(id, start, window_end, window_is_range);
                        self.note_format(id, format.as_ref());
                        self.tree.compound_mut(id).err =
                            Some(Error::Formats(FormatsError { errs }));
                        return Ok(Some(id));
                    }
                    // all-or-nothing: drop the candidate's partial sub-tree
                    self.tree.compound_mut(parent).children.truncate(child_count);
                    self.tree.truncate(nodes_len);
                }
            }
        }

        // every candidate failed: attach an empty errored compound
        self.reader.seek_abs(start)?;
        let range = if window_is_range {
            BitRange::new(start, window_end - start)
        } else {
            BitRange::new(start, 0)
        };
        let id = self
            .tree
            .new_compound(name, false, range, self.cur_buf, Some(parent));
        self.tree.compound_mut(parent).children.push(id);
        self.tree.compound_mut(id).err = Some(Error::Formats(FormatsError { errs }));
        Ok(None)
    }

    /// Widens a dispatched compound to its full window, remembering the
    /// consumed prefix as the inner range when it is shorter.
    fn seal_dispatched(&mut self, id: NodeId, start: u64, window_end: u64, window_is_range: bool) {
        if !window_is_range {
            return;
        }
        let consumed = self.tree.node(id).range;
        let full = BitRange::new(start, window_end - start);
        if consumed != full {
            self.tree.node_mut(id).range = full;
            self.tree.compound_mut(id).inner = Some(consumed);
        }
    }

    /// Records the winning format on a dispatched compound. The compound also
    /// takes the format's description unless the decode function (or the
    /// driver's `description` option) already set one.
    fn note_format(&mut self, id: NodeId, format: &Format) {
        let c = self.tree.compound_mut(id);
        c.format = Some(format.name.clone());
        if c.description.is_empty() && !format.description.is_empty() {
            c.description = format.description.clone();
        }
    }
}

/// Runs one decode: resolves `format_name`, decodes `buf` (restricted to
/// `opts.range` when set), fills gaps, and returns the completed tree.
///
/// With `opts.force` unset a root-level failure returns
/// [`Error::Formats`] and no tree; with it set the partial tree is returned
/// with the error pinned on the root compound.
pub fn decode(buf: BitBuffer, format_name: &str, registry: &Registry, opts: Options) -> Result<Tree> {
    let group = registry.group(format_name)?;
    let range = match opts.range {
        Some(r) => {
            if r.stop() > buf.len() {
                return Err(Error::OutOfBounds { start: r.start, stop: r.stop(), len: buf.len() });
            }
            r
        }
        None => BitRange::new(0, buf.len()),
    };
    tracing::debug!(format = format_name, bits = range.len, force = opts.force, "decode start");

    let mut d = Decoder {
        registry,
        reader: BitReader::with_range(buf.clone(), range)?,
        tree: Tree::new(buf),
        cur: NodeId(0),
        cur_buf: BufId(0),
        force: opts.force,
        cancel: opts.cancel.clone(),
        progress: opts.progress,
        total_bytes: (range.len + 7) / 8,
        reads: 0,
        format_stack: Vec::new(),
    };

    let mut errs: Vec<FormatError> = Vec::new();
    for (i, format) in group.iter().enumerate() {
        if let Some(t) = &d.cancel {
            if t.is_canceled() {
                return Err(Error::Canceled);
            }
        }
        d.tree.truncate(0);
        d.reader.seek_abs(range.start)?;

        let is_array = format.root_variant == RootVariant::Array;
        let root_name = if is_array { format.root_name.clone() } else { String::new() };
        let root = d
            .tree
            .new_compound(root_name, is_array, BitRange::new(range.start, 0), BufId(0), None);
        d.cur = root;
        d.tree.compound_mut(root).description = opts.description.clone();

        d.format_stack.push(format.name.clone());
        let arg = if opts.format_options.is_null() {
            &format.default_in_arg
        } else {
            &opts.format_options
        };
        let res = (format.decode_fn)(&mut d, arg);
        d.format_stack.pop();

        match res {
            Ok(()) => {
                d.finish_compound(root, range.start);
                d.seal_dispatched(root, range.start, range.stop(), true);
                d.note_format(root, format.as_ref());
                if opts.fill_gaps {
                    fill_gaps(&mut d.tree);
                }
                tracing::debug!(nodes = d.tree.len(), "decode done");
                return Ok(d.tree);
            }
            Err(e) if e.is_canceled() => return Err(e),
            Err(e) => {
                errs.push(match e {
                    Error::Format(fe) => fe,
                    other => FormatError {
                        format: format.name.clone(),
                        pos: d.reader.pos(),
                        message: other.to_string(),
                    },
                });
                if opts.force && i + 1 == group.len() {
                    d.finish_compound(root, range.start);
                    d.seal_dispatched(root, range.start, range.stop(), true);
                    d.note_format(root, format.as_ref());
                    d.tree.compound_mut(root).err = Some(Error::Formats(FormatsError { errs }));
                    if opts.fill_gaps {
                        fill_gaps(&mut d.tree);
                    }
                    tracing::debug!(nodes = d.tree.len(), "decode done (forced, with errors)");
                    return Ok(d.tree);
                }
            }
        }
    }
    Err(Error::Formats(FormatsError { errs }))
}

/// Inserts synthetic `unknown` scalars so the direct children of every
/// non-zero-length compound partition its bit range exactly. Zero-length
/// synthetics and re-rooted children are ignored.
fn fill_gaps(tree: &mut Tree) {
    let node_count = tree.len();
    for i in 0..node_count {
        let id = NodeId(i as u32);
        let node = tree.node(id);
        let (range, buf) = (node.range, node.buf);
        if !node.is_compound() || range.len == 0 {
            continue;
        }

        let mut covered: Vec<(u64, u64)> = tree
            .children(id)
            .iter()
            .map(|&ch| tree.node(ch))
            .filter(|n| n.buf == buf && n.range.len > 0)
            .map(|n| (n.range.start, n.range.stop()))
            .collect();
        covered.sort_unstable();

        let mut gaps: Vec<BitRange> = Vec::new();
        let mut pos = range.start;
        for (s, e) in covered {
            if s > pos {
                gaps.push(BitRange::new(pos, s - pos));
            }
            pos = pos.max(e);
        }
        if pos < range.stop() {
            gaps.push(BitRange::new(pos, range.stop() - pos));
        }
        if gaps.is_empty() {
            continue;
        }
        tracing::trace!(node = i, gaps = gaps.len(), "filling unexplained bits");

        let mut gap_ids: Vec<(u64, NodeId)> = Vec::with_capacity(gaps.len());
        for (gi, g) in gaps.iter().enumerate() {
            let mut scalar = Scalar::new(Actual::Bits(*g));
            scalar.unknown = true;
            let gap = tree.new_scalar(format!("unknown{}", gi), *g, buf, Some(id), scalar);
            gap_ids.push((g.start, gap));
        }

        // merge by ascending start; existing children win ties so zero-length
        // synthetics stay next to their logical neighbor
        let old = tree.children(id).to_vec();
        let mut merged = Vec::with_capacity(old.len() + gap_ids.len());
        let mut gi = 0;
        for ch in old {
            let start = tree.node(ch).range.start;
            while gi < gap_ids.len() && gap_ids[gi].0 < start {
                merged.push(gap_ids[gi].1);
                gi += 1;
            }
            merged.push(ch);
        }
        while gi < gap_ids.len() {
            merged.push(gap_ids[gi].1);
            gi += 1;
        }
        tree.compound_mut(id).children = merged;
    }
}
