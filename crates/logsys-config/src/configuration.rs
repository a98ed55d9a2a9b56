//! The log-system configuration: live generation plus retired history.
//!
//! A [`LogConfiguration`] is replaced wholesale on every recovery. The only
//! transition is [`LogConfiguration::retire_generation`], which moves the
//! live groups into `history[0]` and installs a new live generation.
//! Recovery validates a proposed successor with
//! [`LogConfiguration::is_next_generation_of`].
//!
//! # Existential matching
//!
//! [`is_equal_ids`](LogConfiguration::is_equal_ids) and
//! [`is_next_generation_of`](LogConfiguration::is_next_generation_of) succeed
//! when *any* pair of groups matches by id, not when every group matches.
//! Recovery relies on this to tolerate partial overlap between generations.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt::Display;

use logsys_types::{Generation, LogSystemKind, NetworkAddress, Uid, Version};
use serde::{Deserialize, Serialize};

use crate::core_state::{CoreGeneration, CoreGroup, CoreState};
use crate::error::{ConfigError, Result};
use crate::generation::GenerationRecord;
use crate::group::ReplicationGroup;
use crate::identity::IdentityRef;
use crate::server::{LogServer, LogServerInterface};
use crate::settings::Settings;

/// Configuration of the transaction-log tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "ConfigurationFields<T>",
    bound(
        serialize = "T: Serialize",
        deserialize = "T: LogServer + Deserialize<'de>"
    )
)]
pub struct LogConfiguration<T = LogServerInterface> {
    kind: LogSystemKind,
    groups: Vec<ReplicationGroup<T>>,
    history: Vec<GenerationRecord<T>>,
    expected_group_count: u32,
    min_routers: u32,
}

impl<T: LogServer> LogConfiguration<T> {
    /// Creates a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonMonotonicEpochEnd`] if `history` (newest
    /// first) is not ordered by non-increasing `epoch_end`.
    pub fn new(
        kind: LogSystemKind,
        groups: Vec<ReplicationGroup<T>>,
        history: Vec<GenerationRecord<T>>,
        expected_group_count: u32,
        min_routers: u32,
    ) -> Result<Self> {
        let config = Self {
            kind,
            groups,
            history,
            expected_group_count,
            min_routers,
        };
        config.validate()?;
        Ok(config)
    }

    /// Creates the first generation of a log system from settings.
    pub fn initial(settings: &Settings, groups: Vec<ReplicationGroup<T>>) -> Self {
        Self {
            kind: settings.log_system.kind,
            groups,
            history: Vec::new(),
            expected_group_count: settings.log_system.expected_group_count,
            min_routers: settings.log_system.min_routers,
        }
    }

    pub fn kind(&self) -> LogSystemKind {
        self.kind
    }

    /// Groups of the live generation.
    pub fn groups(&self) -> &[ReplicationGroup<T>] {
        &self.groups
    }

    /// Retired generations, newest first.
    pub fn history(&self) -> &[GenerationRecord<T>] {
        &self.history
    }

    pub fn expected_group_count(&self) -> u32 {
        self.expected_group_count
    }

    pub fn min_routers(&self) -> u32 {
        self.min_routers
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Live interfaces of every resolved log server of the live generation,
    /// in group order then server order. Unresolved servers are skipped.
    pub fn all_present_servers(&self) -> impl Iterator<Item = &T> + '_ {
        self.groups.iter().flat_map(ReplicationGroup::present_servers)
    }

    /// Deduplicated `(shared log id, address)` pairs of every resolved log
    /// server across the live generation and all retired generations,
    /// sorted by shared log id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TopologyInconsistency`] if one shared log id is
    /// bound to two different addresses.
    pub fn all_shared_logs(&self) -> Result<Vec<(Uid, NetworkAddress)>> {
        let retired = self.history.iter().flat_map(|record| record.groups().iter());
        let mut bound: BTreeMap<Uid, NetworkAddress> = BTreeMap::new();

        for server in self
            .groups
            .iter()
            .chain(retired)
            .flat_map(ReplicationGroup::present_servers)
        {
            let shared_log_id = server.shared_log_id();
            let address = server.address();
            match bound.entry(shared_log_id) {
                Entry::Vacant(slot) => {
                    slot.insert(address);
                }
                Entry::Occupied(slot) if *slot.get() == address => {}
                Entry::Occupied(slot) => {
                    let first = *slot.get();
                    tracing::error!(
                        shared_log = %shared_log_id,
                        %first,
                        second = %address,
                        "shared log bound to two addresses"
                    );
                    return Err(ConfigError::TopologyInconsistency {
                        shared_log_id,
                        first,
                        second: address,
                    });
                }
            }
        }

        Ok(bound.into_iter().collect())
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    /// Structural equality; same as `==`.
    pub fn is_equal(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.groups == other.groups
            && self.history == other.history
            && self.min_routers == other.min_routers
            && self.expected_group_count == other.expected_group_count
    }

    /// Returns true if some live group of `other` matches some live group of
    /// `self` by id.
    pub fn is_equal_ids(&self, other: &Self) -> bool {
        any_pair_equal_ids(&other.groups, &self.groups)
    }

    /// Returns true if `self` continues `prior`: some live group of `prior`
    /// reappears, by id, in the most recently retired generation of `self`.
    ///
    /// Always false when `self` has no history.
    pub fn is_next_generation_of(&self, prior: &Self) -> bool {
        let Some(previous) = self.history.first() else {
            tracing::debug!("lineage rejected: candidate has no retired generation");
            return false;
        };

        let continues = any_pair_equal_ids(&prior.groups, previous.groups());
        tracing::debug!(
            continues,
            prior_groups = prior.groups.len(),
            retired_groups = previous.groups().len(),
            epoch_end = %previous.epoch_end(),
            "lineage check"
        );
        continues
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Retires the live generation at `epoch_end` and installs `groups` as
    /// the new live generation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonMonotonicEpochEnd`] if `epoch_end` precedes
    /// the epoch end of the most recently retired generation.
    pub fn retire_generation(
        self,
        groups: Vec<ReplicationGroup<T>>,
        epoch_end: Version,
    ) -> Result<Self> {
        if let Some(previous) = self.history.first() {
            if epoch_end < previous.epoch_end() {
                return Err(ConfigError::NonMonotonicEpochEnd {
                    previous: previous.epoch_end(),
                    new: epoch_end,
                });
            }
        }

        let mut history = Vec::with_capacity(self.history.len() + 1);
        history.push(GenerationRecord::new(self.groups, epoch_end));
        history.extend(self.history);

        tracing::debug!(
            %epoch_end,
            history_depth = history.len(),
            live_groups = groups.len(),
            "retired generation"
        );

        Ok(Self {
            kind: self.kind,
            groups,
            history,
            expected_group_count: self.expected_group_count,
            min_routers: self.min_routers,
        })
    }

    /// Drops all but the `keep` most recently retired generations.
    pub fn prune_history(mut self, keep: usize) -> Self {
        self.history.truncate(keep);
        self
    }

    /// Projects this configuration onto the ids-only core state committed by
    /// recovery.
    pub fn to_core_state(&self, recovery_count: Generation) -> CoreState {
        CoreState::from_ordered(
            self.groups.iter().map(CoreGroup::from).collect(),
            self.history.iter().map(CoreGeneration::from).collect(),
            recovery_count,
            self.kind,
        )
    }

    /// Rebuilds a configuration from committed core state.
    ///
    /// Every log server starts unresolved; endpoints are learned later.
    pub fn from_core_state(state: &CoreState) -> Result<Self> {
        let groups = state
            .groups()
            .iter()
            .map(unresolved_group)
            .collect::<Result<Vec<_>>>()?;
        let history = state
            .history()
            .iter()
            .map(|record| {
                Ok(GenerationRecord::new(
                    record
                        .groups()
                        .iter()
                        .map(unresolved_group)
                        .collect::<Result<Vec<_>>>()?,
                    record.epoch_end(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let expected_group_count = u32::try_from(groups.len()).unwrap_or(u32::MAX);
        Self::new(state.kind(), groups, history, expected_group_count, 0)
    }

    fn validate(&self) -> Result<()> {
        for pair in self.history.windows(2) {
            if pair[0].epoch_end() < pair[1].epoch_end() {
                return Err(ConfigError::NonMonotonicEpochEnd {
                    previous: pair[1].epoch_end(),
                    new: pair[0].epoch_end(),
                });
            }
        }
        Ok(())
    }
}

impl<T> Default for LogConfiguration<T> {
    fn default() -> Self {
        Self {
            kind: LogSystemKind::Empty,
            groups: Vec::new(),
            history: Vec::new(),
            expected_group_count: 0,
            min_routers: 0,
        }
    }
}

impl<T: LogServer> PartialEq for LogConfiguration<T> {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl<T: LogServer> Eq for LogConfiguration<T> {}

impl<T> Display for LogConfiguration<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type: {} oldGenerations: {} [",
            self.kind.as_byte(),
            self.history.len()
        )?;
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{group}")?;
        }
        write!(f, "]")
    }
}

/// Existential match: some `a` in `left` and some `b` in `right` with
/// `a.is_equal_ids(b)`.
fn any_pair_equal_ids<T: LogServer>(
    left: &[ReplicationGroup<T>],
    right: &[ReplicationGroup<T>],
) -> bool {
    left.iter()
        .any(|a| right.iter().any(|b| a.is_equal_ids(b)))
}

fn unresolved_group<T: LogServer>(core: &CoreGroup) -> Result<ReplicationGroup<T>> {
    let mut builder = ReplicationGroup::builder()
        .write_anti_quorum(core.write_anti_quorum())
        .replication_factor(core.replication_factor())
        .locality(core.locality())
        .is_local(core.is_local())
        .policy_mode(core.policy_mode());
    if let Some(policy) = core.policy() {
        builder = builder.policy(policy.clone());
    }
    for (id, locality) in core.log_servers().iter().zip(core.localities()) {
        builder = builder.log_server(IdentityRef::from_id(*id), locality.clone());
    }
    builder.build_restored()
}

// ============================================================================
// Deserialization
// ============================================================================

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: LogServer + Deserialize<'de>"))]
struct ConfigurationFields<T> {
    kind: LogSystemKind,
    groups: Vec<ReplicationGroup<T>>,
    history: Vec<GenerationRecord<T>>,
    expected_group_count: u32,
    min_routers: u32,
}

impl<T: LogServer> TryFrom<ConfigurationFields<T>> for LogConfiguration<T> {
    type Error = ConfigError;

    fn try_from(fields: ConfigurationFields<T>) -> Result<Self> {
        Self::new(
            fields.kind,
            fields.groups,
            fields.history,
            fields.expected_group_count,
            fields.min_routers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsys_types::LocalityData;

    fn group(ids: &[u64]) -> ReplicationGroup {
        ids.iter()
            .fold(ReplicationGroup::<LogServerInterface>::builder(), |b, id| {
                b.log_server(IdentityRef::from_id(Uid::new(*id, 0)), LocalityData::new())
            })
            .build()
            .unwrap()
    }

    fn with_history(ends: &[u64]) -> LogConfiguration {
        let history = ends
            .iter()
            .enumerate()
            .map(|(i, end)| GenerationRecord::new(vec![group(&[i as u64 + 10])], Version::new(*end)))
            .collect();
        LogConfiguration::new(LogSystemKind::TagPartitioned, vec![group(&[1])], history, 1, 0)
            .unwrap()
    }

    #[test]
    fn test_default_is_empty() {
        let config: LogConfiguration = LogConfiguration::default();
        assert_eq!(config.kind(), LogSystemKind::Empty);
        assert!(config.groups().is_empty());
        assert!(config.history().is_empty());
        assert_eq!(config.all_present_servers().count(), 0);
        assert!(config.all_shared_logs().unwrap().is_empty());
    }

    #[test]
    fn test_initial_takes_settings() {
        let mut settings = Settings::default();
        settings.log_system.min_routers = 3;
        settings.log_system.expected_group_count = 2;

        let config = LogConfiguration::initial(&settings, vec![group(&[1]), group(&[2])]);
        assert_eq!(config.kind(), LogSystemKind::TagPartitioned);
        assert_eq!(config.min_routers(), 3);
        assert_eq!(config.expected_group_count(), 2);
    }

    #[test]
    fn test_equal_epoch_ends_are_allowed() {
        let config = with_history(&[100, 100, 50]);
        let next = config.retire_generation(vec![group(&[2])], Version::new(100)).unwrap();
        assert_eq!(next.history().len(), 4);
    }

    #[test]
    fn test_prune_history_keeps_newest() {
        let pruned = with_history(&[300, 200, 100]).prune_history(2);
        let ends: Vec<u64> = pruned.history().iter().map(|r| r.epoch_end().as_u64()).collect();
        assert_eq!(ends, vec![300, 200]);

        let untouched = with_history(&[300]).prune_history(5);
        assert_eq!(untouched.history().len(), 1);
    }

    #[test]
    fn test_equality_covers_every_field() {
        let base = with_history(&[100]);
        assert_eq!(base, with_history(&[100]));
        assert_ne!(base, with_history(&[101]));

        let routers = LogConfiguration::new(
            base.kind(),
            base.groups().to_vec(),
            base.history().to_vec(),
            base.expected_group_count(),
            base.min_routers() + 1,
        )
        .unwrap();
        assert_ne!(base, routers);
        assert!(base.is_equal_ids(&routers));
    }

    #[test]
    fn test_display() {
        let config = with_history(&[100]);
        assert_eq!(
            config.to_string(),
            "type: 2 oldGenerations: 1 [anti: 0 replication: 0 local: 1 best: 1 routers: 0 \
             tLogs: [00000000000000010000000000000000] locality: -99]"
        );
    }

    #[test]
    fn test_from_core_state_starts_unresolved() {
        let config = with_history(&[100]);
        let rebuilt: LogConfiguration =
            LogConfiguration::from_core_state(&config.to_core_state(Generation::new(1))).unwrap();

        assert_eq!(rebuilt.expected_group_count(), 1);
        assert_eq!(rebuilt.all_present_servers().count(), 0);
        assert!(rebuilt.is_equal_ids(&config));
        assert!(rebuilt.history()[0].is_equal_ids(&config.history()[0]));
    }

    #[test]
    fn test_from_core_state_keeps_committed_quorum_parameters() {
        let committed = CoreGroup::new(
            vec![Uid::new(1, 0)],
            1,
            3,
            None,
            vec![LocalityData::new()],
        )
        .unwrap();
        let state = CoreState::new(
            vec![committed],
            vec![],
            Generation::new(1),
            LogSystemKind::TagPartitioned,
        )
        .unwrap();

        let rebuilt: LogConfiguration = LogConfiguration::from_core_state(&state).unwrap();
        assert_eq!(rebuilt.groups()[0].write_anti_quorum(), 1);
        assert_eq!(rebuilt.groups()[0].replication_factor(), 3);
    }
}
