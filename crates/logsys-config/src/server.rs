//! The consumed surface of a log server.
//!
//! The configuration model never talks to a log server; it only needs a few
//! stable facts about the live value a recovery authority attached to a
//! membership slot.

use std::fmt::{Debug, Display};

use logsys_types::{NetworkAddress, Uid};
use serde::{Deserialize, Serialize};

/// What the configuration model reads from a resolved log server.
pub trait LogServer: Clone + Debug {
    /// Stable identity of this membership slot.
    fn id(&self) -> Uid;

    /// Identity of the server's connection endpoint.
    ///
    /// Two live values for the same id with different tokens are different
    /// incarnations (e.g., the process restarted and re-registered).
    fn connection_token(&self) -> Uid;

    /// Identity of the on-disk log the process hosts.
    ///
    /// One process can serve many memberships across generations while
    /// sharing a single log.
    fn shared_log_id(&self) -> Uid;

    /// Address of the hosting process.
    fn address(&self) -> NetworkAddress;
}

/// Concrete, serializable log-server interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogServerInterface {
    id: Uid,
    shared_log_id: Uid,
    address: NetworkAddress,
    commit_token: Uid,
}

impl LogServerInterface {
    /// Creates an interface with a freshly generated commit endpoint token.
    pub fn new(id: Uid, shared_log_id: Uid, address: NetworkAddress) -> Self {
        Self {
            id,
            shared_log_id,
            address,
            commit_token: Uid::random(),
        }
    }

    /// Replaces the commit endpoint token.
    pub fn with_commit_token(mut self, token: Uid) -> Self {
        self.commit_token = token;
        self
    }

    pub fn commit_token(&self) -> Uid {
        self.commit_token
    }
}

impl LogServer for LogServerInterface {
    fn id(&self) -> Uid {
        self.id
    }

    fn connection_token(&self) -> Uid {
        self.commit_token
    }

    fn shared_log_id(&self) -> Uid {
        self.shared_log_id
    }

    fn address(&self) -> NetworkAddress {
        self.address
    }
}

impl Display for LogServerInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id.short(), self.address)
    }
}
