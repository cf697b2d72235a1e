//! Core data model: node identity, entries, replica locations, and
//! replication events.
//!
//! A replica location is encoded into the entry's location set as
//! `<node uid>:::<status code>`. The encoding mirrors the metadata
//! store's set column: transitions replace the old encoded string with
//! the new one under a status precondition.

use serde::{Deserialize, Serialize};

use crate::LOCATION_DELIMITER;

/// Role of a node within its zone
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Leader,
    Follower,
}

/// Identity of a single peer node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub uid: String,
    /// Reachable IPv4 address or hostname
    pub address: String,
    pub port: u16,
    pub protocol: String,
    pub zone: String,
    pub role: NodeRole,
}

impl NodeIdentity {
    /// Base URL other nodes and redirected clients use to reach this node
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.address, self.port)
    }

    pub fn is_leader(&self) -> bool {
        self.role == NodeRole::Leader
    }
}

/// Entry kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "f")]
    File,
    #[serde(rename = "d")]
    Directory,
}

/// Per-replica lifecycle status
///
/// Transitions are monotonic: Created -> Reserved -> Exists -> Deleted.
/// Directories are born Exists on every chosen node; the origin node of
/// a file is born Reserved while the remaining replicas start Created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationStatus {
    Created,
    Reserved,
    Exists,
    Deleted,
}

impl LocationStatus {
    /// Numeric code used in the encoded location string
    pub fn code(self) -> i8 {
        match self {
            LocationStatus::Created => 0,
            LocationStatus::Reserved => 1,
            LocationStatus::Exists => 2,
            LocationStatus::Deleted => -1,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(LocationStatus::Created),
            1 => Some(LocationStatus::Reserved),
            2 => Some(LocationStatus::Exists),
            -1 => Some(LocationStatus::Deleted),
            _ => None,
        }
    }
}

/// A decoded (node uid, status) pair from an entry's location set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub uid: String,
    pub status: LocationStatus,
}

impl Location {
    pub fn new(uid: impl Into<String>, status: LocationStatus) -> Self {
        Self {
            uid: uid.into(),
            status,
        }
    }

    /// Encode into the `<uid>:::<code>` set-column representation
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.uid, LOCATION_DELIMITER, self.status.code())
    }

    /// Decode a `<uid>:::<code>` string; `None` on malformed input
    pub fn decode(raw: &str) -> Option<Self> {
        let (uid, code) = raw.split_once(LOCATION_DELIMITER)?;
        if uid.is_empty() {
            return None;
        }
        let status = LocationStatus::from_code(code.parse().ok()?)?;
        Some(Self {
            uid: uid.to_string(),
            status,
        })
    }

    /// Decode the location naming `uid` out of an encoded set, if any
    pub fn find(locations: &[String], uid: &str) -> Option<Self> {
        locations
            .iter()
            .filter_map(|raw| Self::decode(raw))
            .find(|location| location.uid == uid)
    }
}

/// A file or directory record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entry {
    /// Primary key (UUID v4)
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Parent entry uuid; `None` only for the per-user root directory
    pub parent: Option<String>,
    /// Child uuids, present only for directories
    pub children: Option<Vec<String>>,
    /// Logical path, e.g. `/docs/a.txt`
    pub path: String,
    pub owner: i64,
    pub group: i64,
    /// UNIX-like permission string, e.g. `644`
    pub permission: String,
    pub share: Option<String>,
    /// Created timestamp, epoch millis
    pub created: i64,
    /// Last modified timestamp, epoch millis
    pub modified: i64,
    pub size: i64,
    /// Encoded `(uid, status)` location set
    pub locations: Vec<String>,
    /// Physical relative path under the store root
    pub location_path: String,
}

impl Entry {
    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    /// Decoded location for the given node, if the entry is placed there
    pub fn location_for(&self, uid: &str) -> Option<Location> {
        Location::find(&self.locations, uid)
    }
}

/// An account owning entries; provisioning a user creates its
/// owner-scoped entry table lazily.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub groups: Vec<i64>,
}

/// A group entries can be owned under
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

/// Replication event kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventOperation {
    Save,
    Delete,
}

/// Immutable message published once per state-changing action and
/// consumed by every subscribed node.
///
/// Consumption is idempotent: a node ignores events whose target
/// location is not itself or whose expected prior status no longer
/// matches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationEvent {
    pub uuid: String,
    pub owner: i64,
    pub location_path: String,
    pub locations: Vec<String>,
    /// Node that holds (or will hold) the content to pull from
    pub origin: NodeIdentity,
    pub operation: EventOperation,
}

impl ReplicationEvent {
    /// Decoded location naming `uid`, if this event targets it
    pub fn location_for(&self, uid: &str) -> Option<Location> {
        Location::find(&self.locations, uid)
    }
}
