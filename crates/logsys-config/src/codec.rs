//! Durable encoding of configurations and committed core state.
//!
//! Every payload starts with one format byte followed by a `postcard` body.
//! Only [`FormatVersion::Current`] is written. Core state committed by older
//! deployments, which kept a single group per generation, is still readable
//! under [`FormatVersion::LegacySingleGroup`].

use bytes::Bytes;
use logsys_types::{Generation, LocalityData, LogSystemKind, Uid, Version};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::configuration::LogConfiguration;
use crate::core_state::{CoreGeneration, CoreGroup, CoreState};
use crate::error::ConfigError;
use crate::policy::ReplicationPolicyRef;
use crate::server::LogServer;

/// Leading byte of every encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FormatVersion {
    /// One group per generation. Read-only.
    LegacySingleGroup = 1,
    /// Multi-group layout.
    Current = 2,
}

impl FormatVersion {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::LegacySingleGroup),
            2 => Some(Self::Current),
            _ => None,
        }
    }
}

/// Errors from encoding or decoding a payload.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported format version {0}")]
    UnsupportedFormat(u8),

    #[error("empty payload")]
    Empty,

    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),

    /// A legacy payload decoded but does not form a valid group.
    #[error("invalid payload: {0}")]
    Invalid(#[from] ConfigError),
}

// ============================================================================
// Configuration
// ============================================================================

pub fn encode_configuration<T: LogServer + Serialize>(
    config: &LogConfiguration<T>,
) -> Result<Bytes, CodecError> {
    encode(config)
}

/// Decodes a configuration written by [`encode_configuration`].
///
/// # Errors
///
/// Configurations have no legacy layout; any format byte other than
/// [`FormatVersion::Current`] is rejected.
pub fn decode_configuration<T: LogServer + DeserializeOwned>(
    bytes: &[u8],
) -> Result<LogConfiguration<T>, CodecError> {
    let (format, body) = split_format(bytes)?;
    match format {
        FormatVersion::Current => Ok(postcard::from_bytes(body)?),
        FormatVersion::LegacySingleGroup => Err(CodecError::UnsupportedFormat(format.as_byte())),
    }
}

// ============================================================================
// Core state
// ============================================================================

pub fn encode_core_state(state: &CoreState) -> Result<Bytes, CodecError> {
    encode(state)
}

/// Decodes committed core state in either the current or the legacy layout.
pub fn decode_core_state(bytes: &[u8]) -> Result<CoreState, CodecError> {
    let (format, body) = split_format(bytes)?;
    match format {
        FormatVersion::Current => Ok(postcard::from_bytes(body)?),
        FormatVersion::LegacySingleGroup => {
            let legacy: LegacyCoreState = postcard::from_bytes(body)?;
            tracing::warn!(
                recovery_count = %legacy.recovery_count,
                history_depth = legacy.history.len(),
                "decoded core state in legacy single-group layout"
            );
            legacy.upgrade()
        }
    }
}

fn encode<V: Serialize + ?Sized>(value: &V) -> Result<Bytes, CodecError> {
    let mut buf = vec![FormatVersion::Current.as_byte()];
    buf.extend_from_slice(&postcard::to_allocvec(value)?);
    Ok(Bytes::from(buf))
}

fn split_format(bytes: &[u8]) -> Result<(FormatVersion, &[u8]), CodecError> {
    let (&first, body) = bytes.split_first().ok_or(CodecError::Empty)?;
    let format = FormatVersion::from_byte(first).ok_or(CodecError::UnsupportedFormat(first))?;
    Ok((format, body))
}

// ============================================================================
// Legacy layout
// ============================================================================

#[derive(serde::Deserialize)]
#[cfg_attr(test, derive(Serialize))]
struct LegacyCoreGeneration {
    log_servers: Vec<Uid>,
    write_anti_quorum: u32,
    replication_factor: u32,
    policy: Option<ReplicationPolicyRef>,
    epoch_end: Version,
    localities: Vec<LocalityData>,
}

#[derive(serde::Deserialize)]
#[cfg_attr(test, derive(Serialize))]
struct LegacyCoreState {
    log_servers: Vec<Uid>,
    write_anti_quorum: u32,
    recovery_count: Generation,
    replication_factor: u32,
    kind: LogSystemKind,
    history: Vec<LegacyCoreGeneration>,
    policy: Option<ReplicationPolicyRef>,
    localities: Vec<LocalityData>,
}

impl LegacyCoreState {
    fn upgrade(self) -> Result<CoreState, CodecError> {
        let live = CoreGroup::new(
            self.log_servers,
            self.write_anti_quorum,
            self.replication_factor,
            self.policy,
            self.localities,
        )?;

        let history = self
            .history
            .into_iter()
            .map(|record| {
                let group = CoreGroup::new(
                    record.log_servers,
                    record.write_anti_quorum,
                    record.replication_factor,
                    record.policy,
                    record.localities,
                )?;
                Ok(CoreGeneration::new(vec![group], record.epoch_end))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(CoreState::new(vec![live], history, self.recovery_count, self.kind)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::ReplicationGroup;
    use crate::identity::IdentityRef;
    use crate::server::LogServerInterface;
    use test_case::test_case;

    fn uid(n: u64) -> Uid {
        Uid::new(n, 0)
    }

    fn server(n: u64) -> LogServerInterface {
        LogServerInterface::new(uid(n), uid(100 + n), format!("10.0.0.{n}:4500").parse().unwrap())
            .with_commit_token(uid(200 + n))
    }

    fn sample_configuration() -> LogConfiguration {
        let group = ReplicationGroup::<LogServerInterface>::builder()
            .log_server(server(1), LocalityData::new().with(LocalityData::ZONE_ID, "a"))
            .log_server(IdentityRef::from_id(uid(2)), LocalityData::new())
            .replication_factor(2)
            .policy(ReplicationPolicyRef::across(2, "zoneid", ReplicationPolicyRef::one()))
            .build()
            .unwrap();
        LogConfiguration::new(LogSystemKind::TagPartitioned, vec![group], vec![], 1, 0).unwrap()
    }

    fn legacy_payload(legacy: &LegacyCoreState) -> Vec<u8> {
        let mut buf = vec![FormatVersion::LegacySingleGroup.as_byte()];
        buf.extend_from_slice(&postcard::to_allocvec(legacy).unwrap());
        buf
    }

    #[test]
    fn test_configuration_round_trip() {
        let config = sample_configuration();
        let bytes = encode_configuration(&config).unwrap();
        assert_eq!(bytes[0], FormatVersion::Current.as_byte());

        let decoded: LogConfiguration = decode_configuration(&bytes).unwrap();
        assert_eq!(decoded, config);
        assert!(decoded.groups()[0].log_servers()[0].is_resolved());
        assert!(!decoded.groups()[0].log_servers()[1].is_resolved());
    }

    #[test]
    fn test_core_state_round_trip() {
        let state = sample_configuration().to_core_state(Generation::new(4));
        let bytes = encode_core_state(&state).unwrap();
        assert_eq!(decode_core_state(&bytes).unwrap(), state);
    }

    #[test_case(&[]; "empty")]
    #[test_case(&[0, 1, 2]; "format zero")]
    #[test_case(&[9]; "format nine")]
    fn test_rejects_unknown_framing(bytes: &[u8]) {
        let err = decode_core_state(bytes).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Empty | CodecError::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn test_configuration_has_no_legacy_layout() {
        let err = decode_configuration::<LogServerInterface>(&[1, 0]).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFormat(1)));
    }

    #[test]
    fn test_truncated_body_is_postcard_error() {
        let bytes = encode_configuration(&sample_configuration()).unwrap();
        let err = decode_configuration::<LogServerInterface>(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, CodecError::Postcard(_)));
    }

    #[test]
    fn test_legacy_core_state_upgrades_to_single_group_generations() {
        let legacy = LegacyCoreState {
            log_servers: vec![uid(3), uid(4)],
            write_anti_quorum: 0,
            recovery_count: Generation::new(7),
            replication_factor: 2,
            kind: LogSystemKind::TagPartitioned,
            history: vec![LegacyCoreGeneration {
                log_servers: vec![uid(1), uid(2)],
                write_anti_quorum: 1,
                replication_factor: 1,
                policy: Some(ReplicationPolicyRef::one()),
                epoch_end: Version::new(500),
                localities: vec![LocalityData::new(); 2],
            }],
            policy: Some(ReplicationPolicyRef::one()),
            localities: vec![LocalityData::new(); 2],
        };

        let expected = CoreState::new(
            vec![
                CoreGroup::new(
                    vec![uid(3), uid(4)],
                    0,
                    2,
                    Some(ReplicationPolicyRef::one()),
                    vec![LocalityData::new(); 2],
                )
                .unwrap(),
            ],
            vec![CoreGeneration::new(
                vec![
                    CoreGroup::new(
                        vec![uid(1), uid(2)],
                        1,
                        1,
                        Some(ReplicationPolicyRef::one()),
                        vec![LocalityData::new(); 2],
                    )
                    .unwrap(),
                ],
                Version::new(500),
            )],
            Generation::new(7),
            LogSystemKind::TagPartitioned,
        )
        .unwrap();

        let decoded = decode_core_state(&legacy_payload(&legacy)).unwrap();
        assert_eq!(decoded, expected);
        assert_eq!(decoded.prior_committed_log_servers(), vec![uid(1), uid(2)]);

        // Re-encoding always writes the current layout.
        let current = encode_core_state(&decoded).unwrap();
        assert_eq!(current[0], FormatVersion::Current.as_byte());
        assert_eq!(decode_core_state(&current).unwrap(), expected);
    }

    #[test]
    fn test_legacy_core_state_with_bad_localities_is_invalid() {
        let legacy = LegacyCoreState {
            log_servers: vec![uid(1)],
            write_anti_quorum: 0,
            recovery_count: Generation::INITIAL,
            replication_factor: 1,
            kind: LogSystemKind::TagPartitioned,
            history: vec![],
            policy: None,
            localities: vec![],
        };

        let err = decode_core_state(&legacy_payload(&legacy)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Invalid(ConfigError::LocalityCountMismatch { .. })
        ));
    }
}
