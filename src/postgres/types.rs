use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::postgres::parsers::TypeParser;
use crate::Error;

/// Microseconds between the Unix epoch (1970-01-01) and the PostgreSQL
/// epoch (2000-01-01), which WAL timestamps are measured from.
pub const POSTGRES_EPOCH_MICROS: i64 = 946_684_800_000_000;

/// A Log Sequence Number: a 64-bit byte offset into the WAL.
///
/// The textual form is `"H/L"` where `H` and `L` are the uppercase
/// hexadecimal high and low 32-bit halves, each at least one digit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    pub fn from_parts(hi: u32, lo: u32) -> Self {
        Lsn(((hi as u64) << 32) | lo as u64)
    }

    pub fn hi(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn lo(self) -> u32 {
        self.0 as u32
    }

    /// The position one byte past this one. A low half of `0xFFFFFFFF`
    /// rolls over into the high half.
    pub fn advance(self) -> Lsn {
        Lsn(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.hi(), self.lo())
    }
}

impl FromStr for Lsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| Error::Protocol(format!("invalid LSN: {s}")))?;
        let hi = u32::from_str_radix(hi, 16)
            .map_err(|_| Error::Protocol(format!("invalid LSN: {s}")))?;
        let lo = u32::from_str_radix(lo, 16)
            .map_err(|_| Error::Protocol(format!("invalid LSN: {s}")))?;
        Ok(Lsn::from_parts(hi, lo))
    }
}

impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Which columns a table reports in the old half of updates and deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaIdentity {
    Default,
    Nothing,
    Full,
    Index,
}

impl ReplicaIdentity {
    pub(crate) fn from_wire(byte: u8) -> Result<Self, Error> {
        match byte {
            b'd' => Ok(ReplicaIdentity::Default),
            b'n' => Ok(ReplicaIdentity::Nothing),
            b'f' => Ok(ReplicaIdentity::Full),
            b'i' => Ok(ReplicaIdentity::Index),
            other => Err(Error::Protocol(format!(
                "unknown replica identity '{}'",
                other as char
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaIdentity::Default => "default",
            ReplicaIdentity::Nothing => "nothing",
            ReplicaIdentity::Full => "full",
            ReplicaIdentity::Index => "index",
        }
    }
}

impl fmt::Display for ReplicaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A custom type announced by a `Y` message, cached by OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub oid: u32,
    pub schema: String,
    pub name: String,
}

/// One column of a streamed relation.
///
/// `type_schema` and `type_name` are present only when a `Y` message for
/// `type_oid` preceded the relation in the stream.
#[derive(Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub type_oid: u32,
    pub type_modifier: i32,
    pub is_key: bool,
    pub type_schema: Option<String>,
    pub type_name: Option<String>,
    pub(crate) parser: TypeParser,
}

impl fmt::Debug for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnInfo")
            .field("name", &self.name)
            .field("type_oid", &self.type_oid)
            .field("type_modifier", &self.type_modifier)
            .field("is_key", &self.is_key)
            .field("type_schema", &self.type_schema)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// A schema-qualified table as described by an `R` message.
#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub id: u32,
    pub schema: String,
    pub name: String,
    pub replica_identity: ReplicaIdentity,
    pub columns: Vec<ColumnInfo>,
}

impl RelationInfo {
    /// Names of the columns whose replica-identity flag is set.
    pub fn key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// A single decoded tuple field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    /// A text-format datum, parsed through the column's type parser.
    Value(serde_json::Value),
    /// A binary-format datum, preserved as raw bytes.
    Binary(Bytes),
}

/// An insertion-ordered map from column name to decoded value.
///
/// Unchanged TOAST fields with no fallback tuple are absent entirely,
/// not present-as-null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tuple {
    entries: Vec<(String, FieldValue)>,
}

impl Tuple {
    pub fn new() -> Self {
        Tuple::default()
    }

    pub fn insert(&mut self, name: String, value: FieldValue) {
        self.entries.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// One decoded `pgoutput` message.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Begin {
        commit_lsn: Lsn,
        commit_time: DateTime<Utc>,
        xid: u32,
    },
    Commit {
        flags: u8,
        commit_lsn: Lsn,
        end_lsn: Lsn,
        commit_time: DateTime<Utc>,
    },
    Origin {
        lsn: Lsn,
        name: String,
    },
    Type(TypeInfo),
    Relation(Arc<RelationInfo>),
    Insert {
        relation: Arc<RelationInfo>,
        new: Tuple,
    },
    Update {
        relation: Arc<RelationInfo>,
        key: Option<Tuple>,
        old: Option<Tuple>,
        new: Tuple,
    },
    Delete {
        relation: Arc<RelationInfo>,
        key: Option<Tuple>,
        old: Option<Tuple>,
    },
    Truncate {
        relations: Vec<Arc<RelationInfo>>,
        cascade: bool,
        restart_identity: bool,
    },
    Message {
        flags: u8,
        transactional: bool,
        lsn: Lsn,
        prefix: String,
        content: Bytes,
    },
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Begin { .. } => "begin",
            ChangeEvent::Commit { .. } => "commit",
            ChangeEvent::Origin { .. } => "origin",
            ChangeEvent::Type(_) => "type",
            ChangeEvent::Relation(_) => "relation",
            ChangeEvent::Insert { .. } => "insert",
            ChangeEvent::Update { .. } => "update",
            ChangeEvent::Delete { .. } => "delete",
            ChangeEvent::Truncate { .. } => "truncate",
            ChangeEvent::Message { .. } => "message",
        }
    }
}

/// The outer envelope carried in each `CopyData` frame.
#[derive(Debug, Clone)]
pub enum WalFrame {
    Keepalive {
        current_lsn: Lsn,
        system_time: DateTime<Utc>,
        should_respond: bool,
    },
    WalData {
        message_lsn: Lsn,
        current_lsn: Lsn,
        system_time: DateTime<Utc>,
        change: ChangeEvent,
    },
}
