//! Reasoning-oracle contract for the Reweave engine.
//!
//! The engine needs exactly three capabilities from the oracle: classify into
//! an enumerated label set, select zero-or-more ids from an enumerated list,
//! and regenerate a bounded span of source text. All of them go through one
//! `complete(context, prompt) -> text` call; the reply is then run through
//! the defensive parser in [`parse`], which never raises on malformed text.

pub mod http;
pub mod parse;
pub mod provider;

pub use http::HttpOracle;
pub use parse::{parse_reply, strip_code_fences, OracleReply};
pub use provider::{DynOracle, Oracle};
