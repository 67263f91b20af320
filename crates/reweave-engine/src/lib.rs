//! The Reweave modification engine.
//!
//! One request flows through a fixed pipeline: scope classification picks
//! exactly one of three strategies — targeted node edits, whole-file
//! regeneration, or new-component synthesis — then the chosen branch writes
//! through the filesystem sandbox, session state is refreshed, and a
//! structured result is reported. Oracle output is never trusted: every
//! reply goes through defensive parsing and every branch has a conservative
//! or deterministic fallback.

pub mod classify;
pub mod full_file;
pub mod mutator;
pub mod orchestrator;
pub mod prompts;
pub mod selector;
pub mod synthesizer;

pub use classify::ScopeClassifier;
pub use full_file::FullFileMutator;
pub use mutator::{apply, NodeMutator, NodeReplacement};
pub use orchestrator::{ModificationOrchestrator, OrchestratorConfig, Phase};
pub use selector::{NodeSelector, Selection};
pub use synthesizer::{Classification, ComponentSynthesizer};
