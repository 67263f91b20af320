//! Markup element indexer.
//!
//! One pass over a file's text yields an ordered list of addressable
//! [`MarkupNode`]s: sequential ids, tag names, 1-based line/column ranges,
//! verbatim slices, and button/sign-in flags. Node ids are valid only
//! against the parse pass that produced them; every analysis call
//! recomputes the index from current content.
//!
//! The scanner is lexical, not a full grammar: module-level JS strings,
//! template literals, and comments are skipped so `<` inside them is not an
//! element, and inside elements only tag structure matters. Malformed
//! trailing input degrades to fewer nodes, never an error. Nested elements
//! each receive independent entries; consumers must not assume disjoint
//! ranges.

mod indexer;

pub use indexer::{index, index_project_file, MarkupNode};
