//! # logsys-types: Core types for the log-system configuration model
//!
//! This crate contains the leaf value types shared by the transaction-log
//! configuration model:
//! - Identity ([`Uid`])
//! - Addressing ([`NetworkAddress`], [`ParseAddressError`])
//! - Versions and recovery tracking ([`Version`], [`Generation`])
//! - Locality ([`LocalityTag`], [`LocalityData`])
//! - Generation-wide tags ([`LogSystemKind`], [`PolicyMode`])

use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    net::SocketAddr,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

// ============================================================================
// Uid - Copy (fixed 16-byte identifier)
// ============================================================================

/// A 128-bit unique identifier for a log server or a shared log.
///
/// Totally ordered and hashable. The zero value is reserved for "unknown"
/// and is what [`Uid::default`] returns; recruited servers always carry a
/// non-zero id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Uid {
    first: u64,
    second: u64,
}

impl Uid {
    /// The reserved "unknown" identifier.
    pub const UNKNOWN: Uid = Uid {
        first: 0,
        second: 0,
    };

    pub const fn new(first: u64, second: u64) -> Self {
        Self { first, second }
    }

    /// Generates a random identifier using the OS CSPRNG.
    ///
    /// # Panics
    ///
    /// Panics if the OS CSPRNG fails, which indicates a catastrophic
    /// system error (e.g., no entropy source available).
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        getrandom::fill(&mut bytes).expect("CSPRNG failure is catastrophic");
        Self::from_bytes(bytes)
    }

    /// Restores an identifier from its big-endian byte form.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        first.copy_from_slice(&bytes[..8]);
        second.copy_from_slice(&bytes[8..]);
        Self {
            first: u64::from_be_bytes(first),
            second: u64::from_be_bytes(second),
        }
    }

    pub fn to_bytes(self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.first.to_be_bytes());
        bytes[8..].copy_from_slice(&self.second.to_be_bytes());
        bytes
    }

    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn second(&self) -> u64 {
        self.second
    }

    /// Returns true unless this is [`Uid::UNKNOWN`].
    pub fn is_valid(&self) -> bool {
        *self != Self::UNKNOWN
    }

    /// Abbreviated form used in diagnostics: the first half in hex.
    pub fn short(&self) -> String {
        format!("{:016x}", self.first)
    }
}

impl Debug for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uid({:016x}{:016x})", self.first, self.second)
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.first, self.second)
    }
}

impl From<u128> for Uid {
    fn from(value: u128) -> Self {
        Self {
            first: (value >> 64) as u64,
            second: value as u64,
        }
    }
}

impl From<Uid> for u128 {
    fn from(uid: Uid) -> Self {
        (u128::from(uid.first) << 64) | u128::from(uid.second)
    }
}

// ============================================================================
// NetworkAddress - Copy (socket address plus transport flag)
// ============================================================================

/// Network address of a server process.
///
/// Opaque to the configuration model beyond equality and ordering; used to
/// pair shared-log identities with the process that hosts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkAddress {
    addr: SocketAddr,
    tls: bool,
}

impl NetworkAddress {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, tls: false }
    }

    pub fn with_tls(addr: SocketAddr) -> Self {
        Self { addr, tls: true }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }
}

impl Display for NetworkAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tls {
            write!(f, "{}:tls", self.addr)
        } else {
            write!(f, "{}", self.addr)
        }
    }
}

impl From<SocketAddr> for NetworkAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl FromStr for NetworkAddress {
    type Err = ParseAddressError;

    /// Parses `ip:port` or `ip:port:tls`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, tls) = match s.strip_suffix(":tls") {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| ParseAddressError(s.to_string()))?;
        Ok(Self { addr, tls })
    }
}

/// Error returned when a [`NetworkAddress`] cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(String);

impl Display for ParseAddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid network address: {:?}", self.0)
    }
}

impl std::error::Error for ParseAddressError {}

// ============================================================================
// Version - Copy (8-byte commit version)
// ============================================================================

/// Commit version of the write stream.
///
/// A generation's `epoch_end` is the version at which it stopped accepting
/// writes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    pub const ZERO: Version = Version(0);

    pub fn new(version: u64) -> Self {
        Self(version)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

// ============================================================================
// Recovery Tracking - Copy (generation-based recovery count)
// ============================================================================

/// Monotonically increasing recovery generation.
///
/// Each successful recovery installs a new generation of replication groups
/// and bumps this counter in the committed core state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    /// The initial generation (before any recovery).
    pub const INITIAL: Generation = Generation(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the next generation (incremented by 1).
    pub fn next(&self) -> Self {
        Generation(self.0.saturating_add(1))
    }
}

impl Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen:{}", self.0)
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Generation> for u64 {
    fn from(generation: Generation) -> Self {
        generation.0
    }
}

// ============================================================================
// Locality - Copy tag, Clone descriptor
// ============================================================================

/// Datacenter/region tag a replication group serves.
///
/// Non-negative values name a datacenter. Negative values are reserved
/// sentinels; [`LocalityTag::INVALID`] means "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalityTag(i8);

impl LocalityTag {
    /// Unset locality.
    pub const INVALID: LocalityTag = LocalityTag(-99);
    /// Locality of system-special tags.
    pub const SPECIAL: LocalityTag = LocalityTag(-1);
    /// Locality of groups made of log routers.
    pub const LOG_ROUTER: LocalityTag = LocalityTag(-2);
    /// Locality of remote log groups.
    pub const REMOTE_LOG: LocalityTag = LocalityTag(-3);
    /// Locality assigned to groups carried over from an older layout.
    pub const UPGRADED: LocalityTag = LocalityTag(-4);

    pub const fn new(tag: i8) -> Self {
        Self(tag)
    }

    pub fn as_i8(&self) -> i8 {
        self.0
    }

    /// Returns true unless this is [`LocalityTag::INVALID`].
    pub fn is_set(&self) -> bool {
        *self != Self::INVALID
    }

    /// Returns true if the tag names a datacenter (non-negative).
    pub fn is_datacenter(&self) -> bool {
        self.0 >= 0
    }
}

impl Default for LocalityTag {
    fn default() -> Self {
        Self::INVALID
    }
}

impl Display for LocalityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i8> for LocalityTag {
    fn from(value: i8) -> Self {
        Self(value)
    }
}

/// Per-server locality descriptor: a small ordered key/value map.
///
/// Keys follow the conventional names ([`LocalityData::ZONE_ID`] and
/// friends) but arbitrary keys are allowed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LocalityData(BTreeMap<String, String>);

impl LocalityData {
    pub const ZONE_ID: &'static str = "zoneid";
    pub const MACHINE_ID: &'static str = "machineid";
    pub const DC_ID: &'static str = "dcid";
    pub const DATA_HALL: &'static str = "data_hall";
    pub const PROCESS_ID: &'static str = "processid";

    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key/value pair. Builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn zone_id(&self) -> Option<&str> {
        self.get(Self::ZONE_ID)
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.get(Self::MACHINE_ID)
    }

    pub fn dc_id(&self) -> Option<&str> {
        self.get(Self::DC_ID)
    }

    pub fn data_hall(&self) -> Option<&str> {
        self.get(Self::DATA_HALL)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Display for LocalityData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Generation-wide tags - Copy (simple enums)
// ============================================================================

/// Selects which log-system algorithm interprets a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogSystemKind {
    /// No log system has been recruited yet.
    #[default]
    Empty = 0,
    /// Tag-partitioned log system (single- or multi-region).
    TagPartitioned = 2,
}

impl LogSystemKind {
    /// Returns the numeric tag used in diagnostics.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Empty),
            2 => Some(Self::TagPartitioned),
            _ => None,
        }
    }
}

impl Display for LogSystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::TagPartitioned => write!(f, "tag-partitioned"),
        }
    }
}

/// How a replication group's best-effort placement policy is encoded.
///
/// Additional modes get their own variant; the numeric tag is only a
/// diagnostic rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    /// Membership alone encodes the policy; nothing to consult.
    None = 0,
    /// A policy object must be consulted.
    #[default]
    ById = 1,
}

impl PolicyMode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::None),
            1 => Some(Self::ById),
            _ => None,
        }
    }
}

impl Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::ById => write!(f, "by-id"),
        }
    }
}
