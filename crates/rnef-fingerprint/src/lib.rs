//! rnef Fingerprint - content hashing of a project's native surface
//!
//! A fingerprint is a single hex digest over every input that can change the
//! native binary produced for a platform: the platform project directory,
//! native dependencies, package scripts and any extra sources declared by the
//! user. Two checkouts with the same fingerprint can share a cached build.
//!
//! The digest is order dependent. Sources are hashed in the order the
//! enumerator yields them, so every enumerator and the extra-source resolver
//! produce a stable order for a given filesystem state.

pub mod enumerator;
pub mod error;
pub mod excludes;
pub mod fingerprint;
pub mod resolver;
pub mod source;

pub use enumerator::{NativeSurfaceEnumerator, SourceEnumerator};
pub use error::{FingerprintError, Result};
pub use excludes::{default_dir_excludes, ExcludeSet};
pub use fingerprint::{compute_fingerprint, Fingerprint, FingerprintOptions, Fingerprinter};
pub use resolver::{is_glob_pattern, resolve_extra_sources, CUSTOM_USER_CONFIG_REASON};
pub use source::FingerprintSource;
