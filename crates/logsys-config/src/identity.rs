//! Partial-identity references to log servers.
//!
//! An [`IdentityRef`] names a log server by its stable [`Uid`] and may or may
//! not carry the live interface used to reach it. Recovery recruits servers
//! by id first and resolves endpoints later, so both states are normal.
//!
//! # Invariant
//!
//! When a live value is present, `id() == live.id()`. Every constructor and
//! the deserializer derive the id from the live value, so the two can never
//! diverge.
//!
//! # Encoding
//!
//! A reference encodes as a tagged choice: `Unresolved(id)` or
//! `Resolved(live)`. In `postcard` this is byte-identical to "optional live
//! value, followed by the id only when the live value is absent".

use std::fmt::Display;

use logsys_types::Uid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigError, Result};
use crate::server::{LogServer, LogServerInterface};

/// A log server known by id, with an optional live interface.
#[derive(Debug, Clone)]
pub struct IdentityRef<T = LogServerInterface> {
    id: Uid,
    live: Option<T>,
}

impl<T> IdentityRef<T> {
    /// Creates an unresolved reference.
    pub fn from_id(id: Uid) -> Self {
        Self { id, live: None }
    }

    /// Returns the stable identifier. Always succeeds.
    pub fn id(&self) -> Uid {
        self.id
    }

    /// Returns true if the live interface is known.
    pub fn is_resolved(&self) -> bool {
        self.live.is_some()
    }

    /// Returns the live interface.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotResolved`] if the endpoint is not known yet.
    pub fn live(&self) -> Result<&T> {
        self.live.as_ref().ok_or(ConfigError::NotResolved(self.id))
    }

    /// Returns the live interface, if known.
    pub fn live_opt(&self) -> Option<&T> {
        self.live.as_ref()
    }

    /// Compares identifiers only.
    pub fn same_identity(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: LogServer> IdentityRef<T> {
    /// Creates a resolved reference; the id is taken from `live`.
    pub fn resolved(live: T) -> Self {
        Self {
            id: live.id(),
            live: Some(live),
        }
    }

    /// Returns a resolved copy of this reference.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IdentityMismatch`] if `live` belongs to a
    /// different server.
    pub fn resolve(&self, live: T) -> Result<Self> {
        if live.id() != self.id {
            return Err(ConfigError::IdentityMismatch {
                expected: self.id,
                actual: live.id(),
            });
        }
        Ok(Self::resolved(live))
    }

    /// Full structural comparison: same id, same resolution state and, when
    /// resolved, the same connection endpoint.
    ///
    /// Only the endpoint identity is compared; other fields of the live value
    /// may be refreshed without changing the reference.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        if self.id != other.id {
            return false;
        }
        match (&self.live, &other.live) {
            (None, None) => true,
            (Some(a), Some(b)) => a.connection_token() == b.connection_token(),
            _ => false,
        }
    }
}

impl<T> Default for IdentityRef<T> {
    /// Placeholder reference with the unknown id.
    fn default() -> Self {
        Self::from_id(Uid::UNKNOWN)
    }
}

impl<T: LogServer> PartialEq for IdentityRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.structurally_eq(other)
    }
}

impl<T: LogServer> Eq for IdentityRef<T> {}

impl<T> PartialEq<Uid> for IdentityRef<T> {
    fn eq(&self, other: &Uid) -> bool {
        self.id == *other
    }
}

impl<T: LogServer> From<T> for IdentityRef<T> {
    fn from(live: T) -> Self {
        Self::resolved(live)
    }
}

impl<T> Display for IdentityRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

// ============================================================================
// Serde
// ============================================================================

#[derive(Serialize)]
#[serde(rename = "IdentityRef")]
enum IdentityRefOut<'a, T> {
    Unresolved(Uid),
    Resolved(&'a T),
}

#[derive(Deserialize)]
#[serde(rename = "IdentityRef")]
enum IdentityRefIn<T> {
    Unresolved(Uid),
    Resolved(T),
}

impl<T: Serialize> Serialize for IdentityRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.live {
            Some(live) => IdentityRefOut::Resolved(live),
            None => IdentityRefOut::Unresolved(self.id),
        }
        .serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for IdentityRef<T>
where
    T: LogServer + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match IdentityRefIn::deserialize(deserializer)? {
            IdentityRefIn::Unresolved(id) => Self::from_id(id),
            // The live value is authoritative for the id.
            IdentityRefIn::Resolved(live) => Self::resolved(live),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsys_types::NetworkAddress;

    fn interface(id: u64, token: u64) -> LogServerInterface {
        LogServerInterface::new(
            Uid::new(id, 0),
            Uid::new(id, 1),
            NetworkAddress::new(format!("10.0.0.{id}:4500").parse().unwrap()),
        )
        .with_commit_token(Uid::new(token, token))
    }

    #[test]
    fn test_unresolved_reference() {
        let r: IdentityRef = IdentityRef::from_id(Uid::new(7, 0));

        assert_eq!(r.id(), Uid::new(7, 0));
        assert!(!r.is_resolved());
        assert_eq!(r.live().unwrap_err(), ConfigError::NotResolved(Uid::new(7, 0)));
        assert!(r.live_opt().is_none());
    }

    #[test]
    fn test_resolved_reference_takes_id_from_live() {
        let r = IdentityRef::resolved(interface(3, 30));

        assert_eq!(r.id(), Uid::new(3, 0));
        assert!(r.is_resolved());
        assert_eq!(r.live().unwrap().commit_token(), Uid::new(30, 30));
    }

    #[test]
    fn test_default_is_unknown_placeholder() {
        let r: IdentityRef = IdentityRef::default();
        assert_eq!(r.id(), Uid::UNKNOWN);
        assert!(!r.is_resolved());
    }

    #[test]
    fn test_resolve_checks_identity() {
        let r: IdentityRef = IdentityRef::from_id(Uid::new(3, 0));

        let resolved = r.resolve(interface(3, 30)).unwrap();
        assert!(resolved.is_resolved());
        assert!(!r.is_resolved(), "resolve returns a new value");

        let err = r.resolve(interface(4, 40)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::IdentityMismatch {
                expected: Uid::new(3, 0),
                actual: Uid::new(4, 0),
            }
        );
    }

    #[test]
    fn test_structural_equality_tracks_resolution_and_endpoint() {
        let unresolved: IdentityRef = IdentityRef::from_id(Uid::new(3, 0));
        let resolved = IdentityRef::resolved(interface(3, 30));
        let restarted = IdentityRef::resolved(interface(3, 31));

        assert!(unresolved.same_identity(&resolved));
        assert_ne!(unresolved, resolved);
        assert_ne!(resolved, restarted);
        assert_eq!(resolved, IdentityRef::resolved(interface(3, 30)));
    }

    #[test]
    fn test_endpoint_is_the_only_live_field_compared() {
        let a = IdentityRef::resolved(interface(3, 30));
        let moved = LogServerInterface::new(
            Uid::new(3, 0),
            Uid::new(3, 1),
            NetworkAddress::new("10.9.9.9:4500".parse().unwrap()),
        )
        .with_commit_token(Uid::new(30, 30));

        assert_eq!(a, IdentityRef::resolved(moved));
    }

    #[test]
    fn test_display_prints_full_id() {
        let a: IdentityRef = IdentityRef::from_id(Uid::new(1, 2));
        let b: IdentityRef = IdentityRef::from_id(Uid::new(1, 3));

        assert_eq!(a.to_string(), "00000000000000010000000000000002");
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_eq_uid_is_id_only() {
        let r = IdentityRef::resolved(interface(3, 30));
        assert!(r == Uid::new(3, 0));
        assert!(r != Uid::new(4, 0));
    }

    #[test]
    fn test_postcard_layout_matches_optional_then_id() {
        let unresolved: IdentityRef = IdentityRef::from_id(Uid::new(1, 2));
        let bytes = postcard::to_allocvec(&unresolved).unwrap();
        let expected = postcard::to_allocvec(&(None::<LogServerInterface>, Uid::new(1, 2))).unwrap();
        assert_eq!(bytes, expected);

        let live = interface(5, 50);
        let resolved = IdentityRef::resolved(live.clone());
        let bytes = postcard::to_allocvec(&resolved).unwrap();
        let expected = postcard::to_allocvec(&Some(live)).unwrap();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_roundtrip_preserves_resolution_state() {
        for r in [
            IdentityRef::from_id(Uid::new(9, 9)),
            IdentityRef::resolved(interface(9, 90)),
        ] {
            let bytes = postcard::to_allocvec(&r).unwrap();
            let decoded: IdentityRef = postcard::from_bytes(&bytes).unwrap();
            assert_eq!(decoded, r);
            assert_eq!(decoded.is_resolved(), r.is_resolved());
        }
    }
}
