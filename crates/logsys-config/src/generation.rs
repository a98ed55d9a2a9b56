//! Retired generations.

use std::fmt::Display;

use logsys_types::Version;
use serde::{Deserialize, Serialize};

use crate::group::ReplicationGroup;
use crate::server::{LogServer, LogServerInterface};

/// Snapshot of a retired generation: the groups that were live during it
/// and the version at which it stopped accepting writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: LogServer + Deserialize<'de>"
))]
pub struct GenerationRecord<T = LogServerInterface> {
    groups: Vec<ReplicationGroup<T>>,
    epoch_end: Version,
}

impl<T: LogServer> GenerationRecord<T> {
    pub fn new(groups: Vec<ReplicationGroup<T>>, epoch_end: Version) -> Self {
        Self { groups, epoch_end }
    }

    /// Groups live during this generation.
    pub fn groups(&self) -> &[ReplicationGroup<T>] {
        &self.groups
    }

    /// Version at which the generation ended.
    pub fn epoch_end(&self) -> Version {
        self.epoch_end
    }

    pub(crate) fn into_groups(self) -> Vec<ReplicationGroup<T>> {
        self.groups
    }

    /// Positional id-only comparison of the groups. `epoch_end` is ignored.
    pub fn is_equal_ids(&self, other: &Self) -> bool {
        self.groups.len() == other.groups.len()
            && self
                .groups
                .iter()
                .zip(&other.groups)
                .all(|(a, b)| a.is_equal_ids(b))
    }
}

impl<T> Default for GenerationRecord<T> {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            epoch_end: Version::ZERO,
        }
    }
}

impl<T: LogServer> PartialEq for GenerationRecord<T> {
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups && self.epoch_end == other.epoch_end
    }
}

impl<T: LogServer> Eq for GenerationRecord<T> {}

impl<T> Display for GenerationRecord<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "end: {} [", self.epoch_end)?;
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{group}")?;
        }
        write!(f, "]")
    }
}
