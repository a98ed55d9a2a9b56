//! Error types for the log-system configuration model.

use logsys_types::{NetworkAddress, Uid, Version};
use thiserror::Error;

/// Errors raised by the configuration model.
///
/// Every comparison and enumeration is total; these are raised either at
/// construction time (invariant violations) or when a caller asks for data
/// that is not known yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The live endpoint of a log server is not known yet.
    #[error("log server {0} is not resolved")]
    NotResolved(Uid),

    /// A live value was attached to a reference with a different id.
    #[error("cannot resolve {expected} with the interface of {actual}")]
    IdentityMismatch { expected: Uid, actual: Uid },

    /// `localities` is not index-aligned with `log_servers`.
    #[error("group has {servers} log servers but {localities} localities")]
    LocalityCountMismatch { servers: usize, localities: usize },

    /// Anti-quorum leaves no server to acknowledge a write.
    #[error("write anti-quorum {anti_quorum} must be less than the {servers} log servers")]
    InvalidAntiQuorum { anti_quorum: u32, servers: usize },

    /// More replicas requested than there are servers.
    #[error("replication factor {replication_factor} exceeds the {servers} log servers")]
    InvalidReplicationFactor {
        replication_factor: u32,
        servers: usize,
    },

    /// History would not be ordered by epoch end.
    #[error("epoch end {new} precedes the preceding generation's epoch end {previous}")]
    NonMonotonicEpochEnd { previous: Version, new: Version },

    /// One shared log is hosted at two distinct addresses.
    ///
    /// Shared-log identity uniquely determines the hosting process, so this
    /// indicates corrupted topology upstream rather than a runtime failure.
    #[error(
        "topology inconsistency: shared log {shared_log_id} is bound to both {first} and {second}"
    )]
    TopologyInconsistency {
        shared_log_id: Uid,
        first: NetworkAddress,
        second: NetworkAddress,
    },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
