//! Stdio request server standing in for the tool layer.
//!
//! Newline-delimited JSON requests arrive on stdin and responses are
//! written to stdout, one object per line.

pub mod codec;
pub mod server;
