//! Filesystem sandbox and project scanner for the Reweave engine.
//!
//! Every read and write the engine performs goes through [`PathSandbox`]:
//! structural validation against the authorized root, an independent
//! suspicious-pattern deny-list, and an audit log of every attempt. The
//! [`scanner`] module walks the sandbox root and builds the in-memory
//! `ProjectFile` map the engine works against.

pub mod sandbox;
pub mod scanner;

pub use sandbox::{AuditEntry, PathSandbox, SandboxConfig, SecurityLevel, Validation};
pub use scanner::{find_composition_root, scan_project};
