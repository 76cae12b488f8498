//! # bitprobe — binary-format inspection engine
//!
//! Turns an opaque byte/bit stream into a navigable, typed tree of decoded
//! values, annotated with source bit ranges, symbolic interpretations and
//! per-field descriptions, and bridges that tree to an embedded query
//! language as first-class values with stable `_`-prefixed metadata keys.
//!
//! ## Decoding model
//!
//! - **[`BitBuffer`]**: immutable 1-bit-addressed view over a shared byte
//!   source, MSB-first.
//! - **[`Decoder`]**: the handle format plugins decode through — primitive
//!   field reads of arbitrary bit width, struct/array framing via body
//!   closures, length-scoped sub-format dispatch with all-or-nothing
//!   candidate fallback, sub-buffer re-rooting, and error containment.
//! - **[`Tree`]**: the decoded result, an arena of Compound/Scalar nodes
//!   with parent/root/buffer-root/format-root walks and exact bit ranges.
//! - **[`Registry`]**: the write-once catalog of formats and groups;
//!   dependencies are validated when it is sealed.
//! - **[`decode`]**: the driver — picks the root format, runs it, fills
//!   unexplained bits with `unknown` scalars, reports progress, honors
//!   cooperative cancellation.
//!
//! ## Query bridge
//!
//! [`DecodeValue`] adapts any node to the query engine's value contract:
//! `length`/`key`/`index`/`slice`/`each`/`keys`/`has`, conversion to plain
//! [`Value`]s, and the reserved extended keys (`_start`, `_stop`, `_len`,
//! `_name`, `_path`, `_bits`, `_bytes`, `_error`, `_format`, ...). The tree
//! is read-only through the bridge.
//!
//! ## Example
//!
//! ```
//! use bitprobe::{decode, formats, BitBuffer, Options, Registry, Value};
//! use std::collections::HashMap;
//!
//! let mut registry = Registry::new();
//! formats::register_all(&mut registry).unwrap();
//! registry.seal().unwrap();
//!
//! // one 2-byte NAL unit behind a 4-byte length prefix
//! let buf = BitBuffer::from_bytes(vec![0x00, 0x00, 0x00, 0x02, 0x65, 0x88]);
//! let mut in_arg = HashMap::new();
//! in_arg.insert("length_size".to_string(), Value::Int(4));
//!
//! let tree = decode(
//!     buf,
//!     "avc_au",
//!     &registry,
//!     Options { format_options: Value::Object(in_arg), ..Options::default() },
//! )
//! .unwrap();
//!
//! let root = bitprobe::DecodeValue::root(&tree);
//! assert_eq!(root.length(), Some(1));
//! ```

pub mod bits;
pub mod bridge;
pub mod decoder;
pub mod error;
pub mod formats;
pub mod reader;
pub mod registry;
pub mod tree;
pub mod value;

pub use bits::{BitBuffer, BitRange, BitsFormat, BufferRange};
pub use bridge::{BridgeOptions, DecodeValue, QValue};
pub use decoder::{decode, CancelToken, Decoder, Options, ProgressFn};
pub use error::{Error, FormatError, FormatsError, Result};
pub use registry::{DecodeFn, Dependency, Format, FormatGroup, Registry, RootVariant};
pub use tree::{Actual, BufId, Node, NodeId, NodeKind, PathSeg, Scalar, Tree};
pub use value::Value;
