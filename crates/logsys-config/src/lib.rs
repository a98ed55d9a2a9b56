//! # logsys-config: Generation-lineage configuration for a transaction-log tier
//!
//! The log tier of a replicated database is reconfigured on every recovery.
//! Each recovery retires the live generation of replication groups into an
//! ordered history and installs a new one. This crate models that state:
//!
//! - [`IdentityRef`]: a log server known by id, optionally resolved to its
//!   live interface
//! - [`ReplicationGroup`]: servers, routers and quorum parameters of one group
//! - [`GenerationRecord`]: a retired generation and the version it ended at
//! - [`LogConfiguration`]: the live generation plus retired history, with
//!   lineage checks used by recovery
//! - [`CoreState`]: the ids-only projection committed to coordinated storage
//!
//! Values are immutable once built; transitions return new values. The
//! [`codec`] module gives them a durable encoding and [`settings`] loads the
//! parameters applied to newly recruited groups.
//!
//! All types are generic over the [`LogServer`] trait so that callers can
//! plug in their own endpoint type; [`LogServerInterface`] is the default.

pub mod codec;
pub mod configuration;
pub mod core_state;
pub mod error;
pub mod generation;
pub mod group;
pub mod identity;
pub mod policy;
pub mod server;
pub mod settings;

pub use codec::{
    CodecError, FormatVersion, decode_configuration, decode_core_state, encode_configuration,
    encode_core_state,
};
pub use configuration::LogConfiguration;
pub use core_state::{CoreGeneration, CoreGroup, CoreState};
pub use error::{ConfigError, Result};
pub use generation::GenerationRecord;
pub use group::{ReplicationGroup, ReplicationGroupBuilder};
pub use identity::IdentityRef;
pub use policy::{
    DescribedPolicy, PolicyAcross, PolicyAnd, PolicyInfo, PolicyOne, ReplicationPolicy,
    ReplicationPolicyRef,
};
pub use server::{LogServer, LogServerInterface};
pub use settings::{
    LogSystemSettings, RecruitmentSettings, Settings, SettingsError, SettingsLoader,
};
