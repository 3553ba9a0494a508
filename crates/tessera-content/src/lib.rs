//! Tessera Content - cloned-content value tree and reference rewriting
//!
//! Template content is modeled as a recursive value tree. The hard case is
//! the composite scalar: a string of bytes that is itself a length-prefixed
//! encoding of another value tree. A naive byte-level substring replacement
//! inside one of those changes the payload length without updating the
//! prefix and silently corrupts the structure. The rewrite engine here
//! decodes, rewrites, and re-encodes instead, so every length prefix always
//! matches its payload.

#![warn(missing_docs)]

pub mod rewrite;
pub mod value;

pub use rewrite::{rewrite, rewrite_with_limit};
pub use value::{decode, decode_with_limit, encode, ContentError, Scalar, Value, DEFAULT_DEPTH_LIMIT};
