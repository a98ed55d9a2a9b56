//! Core state committed by recovery.
//!
//! Recovery persists an ids-only projection of the log configuration to
//! coordinated storage before the new generation becomes active: log server
//! ids and replication parameters, but no endpoints and no log routers. The
//! next recovery reads it back to learn which servers it must lock.
//!
//! This record is stored durably, so its field order is part of the on-disk
//! format (see [`crate::codec`]).

use logsys_types::{Generation, LocalityData, LocalityTag, LogSystemKind, PolicyMode, Uid, Version};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::generation::GenerationRecord;
use crate::group::ReplicationGroup;
use crate::policy::{ReplicationPolicyRef, policies_match};
use crate::server::LogServer;

/// Ids-only replication group.
///
/// `write_anti_quorum` and `replication_factor` are the values previously
/// used to write to these servers, which may differ from what the current
/// settings would choose for a new generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CoreGroupFields")]
pub struct CoreGroup {
    log_servers: Vec<Uid>,
    write_anti_quorum: u32,
    replication_factor: u32,
    policy: Option<ReplicationPolicyRef>,
    localities: Vec<LocalityData>,
    is_local: bool,
    policy_mode: PolicyMode,
    locality: LocalityTag,
}

impl CoreGroup {
    /// Creates a core group with default placement (local, policy by id,
    /// locality unset).
    pub fn new(
        log_servers: Vec<Uid>,
        write_anti_quorum: u32,
        replication_factor: u32,
        policy: Option<ReplicationPolicyRef>,
        localities: Vec<LocalityData>,
    ) -> Result<Self> {
        let group = Self {
            log_servers,
            write_anti_quorum,
            replication_factor,
            policy,
            localities,
            is_local: true,
            policy_mode: PolicyMode::ById,
            locality: LocalityTag::INVALID,
        };
        group.validate()?;
        Ok(group)
    }

    pub fn with_placement(mut self, locality: LocalityTag, is_local: bool, mode: PolicyMode) -> Self {
        self.locality = locality;
        self.is_local = is_local;
        self.policy_mode = mode;
        self
    }

    pub fn log_servers(&self) -> &[Uid] {
        &self.log_servers
    }

    pub fn write_anti_quorum(&self) -> u32 {
        self.write_anti_quorum
    }

    pub fn replication_factor(&self) -> u32 {
        self.replication_factor
    }

    pub fn policy(&self) -> Option<&ReplicationPolicyRef> {
        self.policy.as_ref()
    }

    pub fn localities(&self) -> &[LocalityData] {
        &self.localities
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn policy_mode(&self) -> PolicyMode {
        self.policy_mode
    }

    pub fn locality(&self) -> LocalityTag {
        self.locality
    }

    /// Only alignment is checked: the quorum parameters record what was
    /// used, and are accepted as committed.
    fn validate(&self) -> Result<()> {
        if self.localities.len() != self.log_servers.len() {
            return Err(ConfigError::LocalityCountMismatch {
                servers: self.log_servers.len(),
                localities: self.localities.len(),
            });
        }
        Ok(())
    }
}

/// Localities are metadata and are not compared.
impl PartialEq for CoreGroup {
    fn eq(&self, other: &Self) -> bool {
        self.log_servers == other.log_servers
            && self.write_anti_quorum == other.write_anti_quorum
            && self.replication_factor == other.replication_factor
            && self.is_local == other.is_local
            && self.policy_mode == other.policy_mode
            && self.locality == other.locality
            && policies_match(self.policy.as_ref(), other.policy.as_ref())
    }
}

impl Eq for CoreGroup {}

impl<T: LogServer> From<&ReplicationGroup<T>> for CoreGroup {
    fn from(group: &ReplicationGroup<T>) -> Self {
        Self {
            log_servers: group.server_ids().collect(),
            write_anti_quorum: group.write_anti_quorum(),
            replication_factor: group.replication_factor(),
            policy: group.policy().cloned(),
            localities: group.localities().to_vec(),
            is_local: group.is_local(),
            policy_mode: group.policy_mode(),
            locality: group.locality(),
        }
    }
}

#[derive(Deserialize)]
struct CoreGroupFields {
    log_servers: Vec<Uid>,
    write_anti_quorum: u32,
    replication_factor: u32,
    policy: Option<ReplicationPolicyRef>,
    localities: Vec<LocalityData>,
    is_local: bool,
    policy_mode: PolicyMode,
    locality: LocalityTag,
}

impl TryFrom<CoreGroupFields> for CoreGroup {
    type Error = ConfigError;

    fn try_from(fields: CoreGroupFields) -> Result<Self> {
        Ok(Self::new(
            fields.log_servers,
            fields.write_anti_quorum,
            fields.replication_factor,
            fields.policy,
            fields.localities,
        )?
        .with_placement(fields.locality, fields.is_local, fields.policy_mode))
    }
}

/// Ids-only retired generation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreGeneration {
    groups: Vec<CoreGroup>,
    epoch_end: Version,
}

impl CoreGeneration {
    pub fn new(groups: Vec<CoreGroup>, epoch_end: Version) -> Self {
        Self { groups, epoch_end }
    }

    pub fn groups(&self) -> &[CoreGroup] {
        &self.groups
    }

    pub fn epoch_end(&self) -> Version {
        self.epoch_end
    }
}

impl<T: LogServer> From<&GenerationRecord<T>> for CoreGeneration {
    fn from(record: &GenerationRecord<T>) -> Self {
        Self {
            groups: record.groups().iter().map(CoreGroup::from).collect(),
            epoch_end: record.epoch_end(),
        }
    }
}

/// The log-system state recovery commits to coordinated storage.
///
/// `history` is newest first and ordered by non-increasing `epoch_end`; the
/// constructor and the deserializer both reject anything else.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "CoreStateFields")]
pub struct CoreState {
    groups: Vec<CoreGroup>,
    history: Vec<CoreGeneration>,
    recovery_count: Generation,
    kind: LogSystemKind,
}

impl CoreState {
    /// # Errors
    ///
    /// Returns [`ConfigError::NonMonotonicEpochEnd`] if `history` is not
    /// ordered newest first.
    pub fn new(
        groups: Vec<CoreGroup>,
        history: Vec<CoreGeneration>,
        recovery_count: Generation,
        kind: LogSystemKind,
    ) -> Result<Self> {
        for pair in history.windows(2) {
            if pair[0].epoch_end < pair[1].epoch_end {
                return Err(ConfigError::NonMonotonicEpochEnd {
                    previous: pair[1].epoch_end,
                    new: pair[0].epoch_end,
                });
            }
        }
        Ok(Self::from_ordered(groups, history, recovery_count, kind))
    }

    /// Skips the ordering check for history taken from an already validated
    /// configuration.
    pub(crate) fn from_ordered(
        groups: Vec<CoreGroup>,
        history: Vec<CoreGeneration>,
        recovery_count: Generation,
        kind: LogSystemKind,
    ) -> Self {
        Self {
            groups,
            history,
            recovery_count,
            kind,
        }
    }

    /// Groups of the live generation.
    pub fn groups(&self) -> &[CoreGroup] {
        &self.groups
    }

    /// Retired generations, newest first.
    pub fn history(&self) -> &[CoreGeneration] {
        &self.history
    }

    /// Increases with every successful recovery.
    pub fn recovery_count(&self) -> Generation {
        self.recovery_count
    }

    pub fn kind(&self) -> LogSystemKind {
        self.kind
    }

    /// Every log server id of every retired generation, newest generation
    /// first, then group order, then server order.
    ///
    /// A server that served several retired generations appears once per
    /// membership.
    pub fn prior_committed_log_servers(&self) -> Vec<Uid> {
        self.history
            .iter()
            .flat_map(|record| record.groups.iter())
            .flat_map(|group| group.log_servers.iter().copied())
            .collect()
    }

    /// Structural equality; same as `==`.
    pub fn is_equal(&self, other: &Self) -> bool {
        self == other
    }
}

#[derive(Deserialize)]
struct CoreStateFields {
    groups: Vec<CoreGroup>,
    history: Vec<CoreGeneration>,
    recovery_count: Generation,
    kind: LogSystemKind,
}

impl TryFrom<CoreStateFields> for CoreState {
    type Error = ConfigError;

    fn try_from(fields: CoreStateFields) -> Result<Self> {
        Self::new(fields.groups, fields.history, fields.recovery_count, fields.kind)
    }
}
