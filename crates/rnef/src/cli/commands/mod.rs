//! CLI commands

mod cache;
mod fingerprint;
mod remote_cache;

pub use cache::CacheCommand;
pub use fingerprint::FingerprintCommand;
pub use remote_cache::RemoteCacheCommand;
