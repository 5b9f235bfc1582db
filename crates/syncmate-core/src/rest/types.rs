//! Values materialized from daemon responses.
//!
//! Everything here is a fresh copy: the facade never hands out references
//! into its cached configuration document.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ApiError;

/// Key of the aggregate entry in a [`Connections`] map. Reserved: never a peer identity.
pub const LOCAL_NODE_CONNECTIONS: &str = "total";

/// A remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub node_id: String,
    pub name: String,
    /// Space-separated addresses, `None` when the daemon stores none.
    pub addresses: Option<String>,
}

/// A replicated directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: String,
    pub directory: String,
    pub read_only: bool,
    /// Always `true`: permission bits are not supported on the host.
    pub ignore_perms: bool,
    /// Daemon diagnostic; `None` when the daemon reports an empty string.
    pub invalid: Option<String>,
    /// Peers this directory is shared with, local node excluded.
    pub nodes: Vec<Node>,
    pub versioning: Versioning,
}

/// File versioning policy of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Versioning {
    #[default]
    None,
    /// Keep the last `keep` versions of every changed file.
    Simple { keep: u32 },
}

impl Versioning {
    pub const SIMPLE_TYPE: &'static str = "simple";

    /// Wire `Type` tag: empty for [`Versioning::None`].
    pub fn type_tag(&self) -> &'static str {
        match self {
            Versioning::None => "",
            Versioning::Simple { .. } => Self::SIMPLE_TYPE,
        }
    }

    /// Wire `Params` map with every value rendered as decimal text.
    pub fn params(&self) -> BTreeMap<String, String> {
        match self {
            Versioning::None => BTreeMap::new(),
            Versioning::Simple { keep } => BTreeMap::from([("keep".to_string(), keep.to_string())]),
        }
    }

    /// `{"Type": .., "Params": {..}}` as stored in the daemon config.
    pub fn to_wire(&self) -> Value {
        json!({
            "Type": self.type_tag(),
            "Params": self.params(),
        })
    }
}

/// Resource snapshot of the daemon process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// Bytes currently allocated.
    pub alloc: u64,
    pub cpu_percent: f64,
    #[serde(default, rename = "extAnnounceOK")]
    pub ext_announce_ok: bool,
    pub goroutines: u32,
    #[serde(rename = "myID")]
    pub my_id: String,
    /// Bytes obtained from the OS.
    pub sys: u64,
}

/// Traffic counters for one connection, or for the local node under
/// [`LOCAL_NODE_CONNECTIONS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Connection {
    #[serde(default)]
    pub at: String,
    pub in_bytes_total: u64,
    pub out_bytes_total: u64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub client_version: String,
    #[serde(default)]
    pub completion: f64,
}

/// Connections keyed by peer identity, plus the reserved `"total"` entry.
pub type Connections = HashMap<String, Connection>;

/// Top-level configuration objects addressable through `get_value`/`set_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Options,
    Gui,
}

impl Section {
    /// Key of the section in the configuration document.
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Options => "Options",
            Section::Gui => "GUI",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "options" => Ok(Section::Options),
            "gui" => Ok(Section::Gui),
            _ => Err(ApiError::UnknownSection(s.to_string())),
        }
    }
}
