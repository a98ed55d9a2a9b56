//! Opaque replication-policy references.
//!
//! The configuration model never evaluates a policy. It only needs to tell
//! whether two groups reference the same policy, which is decided by the
//! policy's [`PolicyInfo`] descriptor. Policies are shared immutably between
//! groups through [`ReplicationPolicyRef`].

use std::fmt::{Debug, Display};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Comparable descriptor of a replication policy, e.g. `zoneid^3 x 1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyInfo(String);

impl PolicyInfo {
    pub fn new(info: impl Into<String>) -> Self {
        Self(info.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PolicyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A replication policy as seen by the configuration model.
pub trait ReplicationPolicy: Debug + Send + Sync {
    /// Descriptor used for equality between policy references.
    fn info(&self) -> PolicyInfo;
}

/// Any single server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyOne;

impl ReplicationPolicy for PolicyOne {
    fn info(&self) -> PolicyInfo {
        PolicyInfo::new("1")
    }
}

/// `count` distinct values of a locality attribute, each satisfying the
/// embedded policy.
#[derive(Debug, Clone)]
pub struct PolicyAcross {
    count: u32,
    attribute: String,
    embedded: ReplicationPolicyRef,
}

impl PolicyAcross {
    pub fn new(count: u32, attribute: impl Into<String>, embedded: ReplicationPolicyRef) -> Self {
        Self {
            count,
            attribute: attribute.into(),
            embedded,
        }
    }
}

impl ReplicationPolicy for PolicyAcross {
    fn info(&self) -> PolicyInfo {
        PolicyInfo(format!(
            "{}^{} x {}",
            self.attribute,
            self.count,
            self.embedded.info()
        ))
    }
}

/// Conjunction of policies.
#[derive(Debug, Clone)]
pub struct PolicyAnd {
    policies: Vec<ReplicationPolicyRef>,
}

impl PolicyAnd {
    pub fn new(policies: Vec<ReplicationPolicyRef>) -> Self {
        Self { policies }
    }
}

impl ReplicationPolicy for PolicyAnd {
    fn info(&self) -> PolicyInfo {
        let parts = self
            .policies
            .iter()
            .map(|p| p.info().0)
            .collect::<Vec<_>>()
            .join(" & ");
        PolicyInfo(format!("({parts})"))
    }
}

/// A policy known only by its descriptor.
///
/// Decoding a policy reference yields this type: the descriptor is all the
/// configuration model ever reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribedPolicy {
    info: PolicyInfo,
}

impl DescribedPolicy {
    pub fn new(info: PolicyInfo) -> Self {
        Self { info }
    }
}

impl ReplicationPolicy for DescribedPolicy {
    fn info(&self) -> PolicyInfo {
        self.info.clone()
    }
}

/// Shared, immutable reference to a replication policy.
///
/// Two references are equal iff their descriptors are equal, regardless of
/// the concrete policy type behind them.
#[derive(Clone)]
pub struct ReplicationPolicyRef(Arc<dyn ReplicationPolicy>);

impl ReplicationPolicyRef {
    pub fn new(policy: impl ReplicationPolicy + 'static) -> Self {
        Self(Arc::new(policy))
    }

    pub fn one() -> Self {
        Self::new(PolicyOne)
    }

    pub fn across(count: u32, attribute: impl Into<String>, embedded: ReplicationPolicyRef) -> Self {
        Self::new(PolicyAcross::new(count, attribute, embedded))
    }

    pub fn info(&self) -> PolicyInfo {
        self.0.info()
    }

    /// Returns true if both references point at the same policy instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ReplicationPolicyRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.info() == other.info()
    }
}

impl Eq for ReplicationPolicyRef {}

impl Debug for ReplicationPolicyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReplicationPolicyRef({})", self.info())
    }
}

impl Display for ReplicationPolicyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.info())
    }
}

impl Serialize for ReplicationPolicyRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.info().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ReplicationPolicyRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let info = PolicyInfo::deserialize(deserializer)?;
        Ok(Self::new(DescribedPolicy::new(info)))
    }
}

/// Compares two optional policy references: both absent, or both present
/// with equal descriptors.
pub(crate) fn policies_match(
    a: Option<&ReplicationPolicyRef>,
    b: Option<&ReplicationPolicyRef>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
