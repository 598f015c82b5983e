//! Sandboxed guest runtime for SkillHub skill execution.
//!
//! One launch runs one skill blob: [`harness`] stages the blob and a
//! language-specific runner into a private scratch directory, [`host`]
//! spawns it with the inputs JSON on stdin and reads a sentinel-framed
//! result line back, and [`isolation`] derives the kernel confinement for
//! that launch from the scratch directory and the caller's
//! [`ResourceCaps`] — host tree read-only, scratch dir writable, memory
//! capped, network denied unless relaxed.
//!
//! The engine consumes all of this through the [`SandboxHost`] trait, so
//! everything above the guest boundary is testable with in-process stubs.

pub mod caps;
pub mod harness;
pub mod host;
pub mod isolation;
pub mod outcome;

pub use caps::ResourceCaps;
pub use harness::GuestLanguage;
pub use host::{ProcessSandbox, SandboxHost};
pub use isolation::GuestIsolation;
pub use outcome::GuestFailure;
