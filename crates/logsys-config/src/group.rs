//! Replication groups.
//!
//! A [`ReplicationGroup`] is one logical replication unit of a generation:
//! the primary log servers for one locality, the log routers feeding it, its
//! quorum parameters and the policy that placed it.
//!
//! Groups are immutable once built. A changed group is a new value built
//! through [`ReplicationGroupBuilder`], which rejects misaligned localities
//! and quorum parameters the group cannot satisfy. Decoding only rejects
//! misaligned localities: a persisted group is accepted with the quorum
//! parameters it was written with.

use std::fmt::Display;

use logsys_types::{LocalityData, LocalityTag, PolicyMode, Uid};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::identity::IdentityRef;
use crate::policy::{ReplicationPolicyRef, policies_match};
use crate::server::{LogServer, LogServerInterface};
use crate::settings::RecruitmentSettings;

// ============================================================================
// Replication Group
// ============================================================================

/// One replication group of a generation.
///
/// # Equality
///
/// `==` is structural: quorum parameters, locality, policy descriptor and,
/// index by index, each log server's id, resolution state and endpoint.
/// `log_routers` and `localities` are deliberately left out; they can be
/// refreshed without changing the group's identity.
///
/// [`is_equal_ids`](Self::is_equal_ids) is the coarser "same logical group"
/// test that compares log servers by id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "GroupFields<T>",
    bound(
        serialize = "T: Serialize",
        deserialize = "T: LogServer + Deserialize<'de>"
    )
)]
pub struct ReplicationGroup<T = LogServerInterface> {
    log_servers: Vec<IdentityRef<T>>,
    log_routers: Vec<IdentityRef<T>>,
    write_anti_quorum: u32,
    replication_factor: u32,
    localities: Vec<LocalityData>,
    policy: Option<ReplicationPolicyRef>,
    locality: LocalityTag,
    is_local: bool,
    policy_mode: PolicyMode,
}

impl<T: LogServer> ReplicationGroup<T> {
    /// Starts building a group with default parameters.
    pub fn builder() -> ReplicationGroupBuilder<T> {
        ReplicationGroupBuilder::new()
    }

    pub fn log_servers(&self) -> &[IdentityRef<T>] {
        &self.log_servers
    }

    pub fn log_routers(&self) -> &[IdentityRef<T>] {
        &self.log_routers
    }

    pub fn write_anti_quorum(&self) -> u32 {
        self.write_anti_quorum
    }

    pub fn replication_factor(&self) -> u32 {
        self.replication_factor
    }

    /// Locality of each log server, index-aligned with [`log_servers`](Self::log_servers).
    pub fn localities(&self) -> &[LocalityData] {
        &self.localities
    }

    pub fn policy(&self) -> Option<&ReplicationPolicyRef> {
        self.policy.as_ref()
    }

    pub fn locality(&self) -> LocalityTag {
        self.locality
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn policy_mode(&self) -> PolicyMode {
        self.policy_mode
    }

    /// Number of log servers that must acknowledge a write.
    pub fn write_quorum(&self) -> usize {
        self.log_servers
            .len()
            .saturating_sub(self.write_anti_quorum as usize)
    }

    /// Ids of the log servers, in membership order.
    pub fn server_ids(&self) -> impl Iterator<Item = Uid> + '_ {
        self.log_servers.iter().map(IdentityRef::id)
    }

    /// Live interfaces of the resolved log servers, in membership order.
    pub fn present_servers(&self) -> impl Iterator<Item = &T> + '_ {
        self.log_servers.iter().filter_map(IdentityRef::live_opt)
    }

    /// Returns true if `id` is one of the log servers.
    pub fn contains(&self, id: Uid) -> bool {
        self.log_servers.iter().any(|server| *server == id)
    }

    /// Returns true if both groups have the same parameters and the same log
    /// server ids in the same positions.
    ///
    /// Resolution state and endpoints are ignored.
    pub fn is_equal_ids(&self, other: &Self) -> bool {
        self.same_parameters(other)
            && self
                .log_servers
                .iter()
                .zip(&other.log_servers)
                .all(|(a, b)| a.same_identity(b))
    }

    /// Parameter comparison shared by `==` and `is_equal_ids`.
    fn same_parameters(&self, other: &Self) -> bool {
        self.write_anti_quorum == other.write_anti_quorum
            && self.replication_factor == other.replication_factor
            && self.is_local == other.is_local
            && self.policy_mode == other.policy_mode
            && self.log_servers.len() == other.log_servers.len()
            && self.locality == other.locality
            && policies_match(self.policy.as_ref(), other.policy.as_ref())
    }

    /// Checks the invariant every group carries, recruited or restored:
    /// one locality per log server.
    fn validate_alignment(&self) -> Result<()> {
        let servers = self.log_servers.len();
        if self.localities.len() != servers {
            return Err(ConfigError::LocalityCountMismatch {
                servers,
                localities: self.localities.len(),
            });
        }
        Ok(())
    }

    /// Checks a newly recruited group: alignment plus quorum parameters the
    /// group can actually satisfy.
    fn validate_recruited(&self) -> Result<()> {
        self.validate_alignment()?;
        let servers = self.log_servers.len();
        if servers > 0 {
            if self.write_anti_quorum as usize >= servers {
                return Err(ConfigError::InvalidAntiQuorum {
                    anti_quorum: self.write_anti_quorum,
                    servers,
                });
            }
            if self.replication_factor as usize > servers {
                return Err(ConfigError::InvalidReplicationFactor {
                    replication_factor: self.replication_factor,
                    servers,
                });
            }
        }
        Ok(())
    }
}

impl<T: LogServer> PartialEq for ReplicationGroup<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same_parameters(other)
            && self
                .log_servers
                .iter()
                .zip(&other.log_servers)
                .all(|(a, b)| a.structurally_eq(b))
    }
}

impl<T: LogServer> Eq for ReplicationGroup<T> {}

impl<T> Display for ReplicationGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "anti: {} replication: {} local: {} best: {} routers: {} tLogs: [",
            self.write_anti_quorum,
            self.replication_factor,
            u8::from(self.is_local),
            self.policy_mode.as_byte(),
            self.log_routers.len(),
        )?;
        for (i, server) in self.log_servers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{server}")?;
        }
        write!(f, "] locality: {}", self.locality)
    }
}

// ============================================================================
// Deserialization
// ============================================================================

/// Unvalidated wire form of a group; same field order as the group.
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: LogServer + Deserialize<'de>"))]
struct GroupFields<T> {
    log_servers: Vec<IdentityRef<T>>,
    log_routers: Vec<IdentityRef<T>>,
    write_anti_quorum: u32,
    replication_factor: u32,
    localities: Vec<LocalityData>,
    policy: Option<ReplicationPolicyRef>,
    locality: LocalityTag,
    is_local: bool,
    policy_mode: PolicyMode,
}

impl<T: LogServer> TryFrom<GroupFields<T>> for ReplicationGroup<T> {
    type Error = ConfigError;

    fn try_from(fields: GroupFields<T>) -> Result<Self> {
        let group = Self {
            log_servers: fields.log_servers,
            log_routers: fields.log_routers,
            write_anti_quorum: fields.write_anti_quorum,
            replication_factor: fields.replication_factor,
            localities: fields.localities,
            policy: fields.policy,
            locality: fields.locality,
            is_local: fields.is_local,
            policy_mode: fields.policy_mode,
        };
        // Persisted groups keep whatever quorum parameters they were written
        // with.
        group.validate_alignment()?;
        Ok(group)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Validating builder for [`ReplicationGroup`].
///
/// # Example
///
/// ```
/// use logsys_config::{IdentityRef, ReplicationGroup, ReplicationPolicyRef};
/// use logsys_types::{LocalityData, Uid};
///
/// let group: ReplicationGroup = ReplicationGroup::builder()
///     .log_server(IdentityRef::from_id(Uid::new(1, 0)), LocalityData::new())
///     .log_server(IdentityRef::from_id(Uid::new(2, 0)), LocalityData::new())
///     .replication_factor(2)
///     .policy(ReplicationPolicyRef::one())
///     .build()
///     .unwrap();
///
/// assert_eq!(group.write_quorum(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ReplicationGroupBuilder<T = LogServerInterface> {
    group: ReplicationGroup<T>,
}

impl<T: LogServer> ReplicationGroupBuilder<T> {
    /// Defaults: no servers, anti-quorum 0, replication factor 0, local,
    /// policy consulted by id, locality unset.
    pub fn new() -> Self {
        Self {
            group: ReplicationGroup {
                log_servers: Vec::new(),
                log_routers: Vec::new(),
                write_anti_quorum: 0,
                replication_factor: 0,
                localities: Vec::new(),
                policy: None,
                locality: LocalityTag::INVALID,
                is_local: true,
                policy_mode: PolicyMode::ById,
            },
        }
    }

    /// Seeds the parameters from recruitment settings.
    pub fn from_settings(settings: &RecruitmentSettings) -> Self {
        Self::new()
            .write_anti_quorum(settings.write_anti_quorum)
            .replication_factor(settings.replication_factor)
            .locality(settings.locality)
            .is_local(settings.is_local)
            .policy_mode(settings.policy_mode)
    }

    /// Appends a log server together with its locality.
    pub fn log_server(mut self, server: impl Into<IdentityRef<T>>, locality: LocalityData) -> Self {
        self.group.log_servers.push(server.into());
        self.group.localities.push(locality);
        self
    }

    /// Replaces every locality. Must stay index-aligned with the log servers.
    pub fn localities(mut self, localities: Vec<LocalityData>) -> Self {
        self.group.localities = localities;
        self
    }

    pub fn log_router(mut self, router: impl Into<IdentityRef<T>>) -> Self {
        self.group.log_routers.push(router.into());
        self
    }

    pub fn write_anti_quorum(mut self, anti_quorum: u32) -> Self {
        self.group.write_anti_quorum = anti_quorum;
        self
    }

    pub fn replication_factor(mut self, replication_factor: u32) -> Self {
        self.group.replication_factor = replication_factor;
        self
    }

    pub fn policy(mut self, policy: ReplicationPolicyRef) -> Self {
        self.group.policy = Some(policy);
        self
    }

    pub fn locality(mut self, locality: LocalityTag) -> Self {
        self.group.locality = locality;
        self
    }

    pub fn is_local(mut self, is_local: bool) -> Self {
        self.group.is_local = is_local;
        self
    }

    pub fn policy_mode(mut self, mode: PolicyMode) -> Self {
        self.group.policy_mode = mode;
        self
    }

    /// Validates and returns the group.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::LocalityCountMismatch`] if localities are not
    ///   index-aligned with log servers
    /// - [`ConfigError::InvalidAntiQuorum`] if no server would remain to
    ///   acknowledge writes
    /// - [`ConfigError::InvalidReplicationFactor`] if the factor exceeds the
    ///   server count
    pub fn build(self) -> Result<ReplicationGroup<T>> {
        self.group.validate_recruited()?;
        Ok(self.group)
    }

    /// Validates alignment only, for groups rebuilt from committed state.
    pub(crate) fn build_restored(self) -> Result<ReplicationGroup<T>> {
        self.group.validate_alignment()?;
        Ok(self.group)
    }
}

impl<T: LogServer> Default for ReplicationGroupBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
