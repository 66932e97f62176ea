//! Response diffing.
//!
//! A comparison runs in two stages:
//!
//! | Stage    | Module     | Fields                                            |
//! |----------|------------|---------------------------------------------------|
//! | protocol | `protocol` | `status`, allow-listed headers, `body_hash`       |
//! | content  | `image`    | `image_error`, size, `format`, `frame_num`, hashes |
//!
//! The content stage only runs when the protocol stage already found a
//! difference (see [`DiffEngine`]).

pub mod engine;
pub mod hash;
pub mod image;
pub mod protocol;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

pub use engine::{ContentComparer, DiffEngine};
pub use hash::{HashKind, ImageHash};
pub use self::image::{ImageComparer, ImageInfo};

// ── Field names ──────────────────────────────────────────────────

pub const STATUS: &str = "status";
pub const BODY_HASH: &str = "body_hash";

pub const IMAGE_ERROR: &str = "image_error";
pub const WIDTH: &str = "width";
pub const HEIGHT: &str = "height";
pub const FORMAT: &str = "format";
pub const FRAME_NUM: &str = "frame_num";
pub const AVERAGE_HASH: &str = "average_hash";
pub const DIFFERENCE_HASH: &str = "difference_hash";
pub const PERCEPTION_HASH: &str = "perception_hash";

/// Headers compared by the protocol stage. Any other header is ignored.
pub const COMPARE_HEADERS: &[&str] = &["Content-Length", "Content-Type"];

// ── DiffEntry ────────────────────────────────────────────────────

/// One observed difference: the original value and the replayed value.
///
/// Hash-distance entries put the distance in `original` and `0` in
/// `replayed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiffEntry {
    #[serde(rename = "string")]
    Str { original: String, replayed: String },
    Int { original: i64, replayed: i64 },
    Bytes {
        #[serde(serialize_with = "printable_bytes")]
        original: Vec<u8>,
        #[serde(serialize_with = "printable_bytes")]
        replayed: Vec<u8>,
    },
}

/// Borrowed view of one side of a [`DiffEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffValue<'a> {
    Str(&'a str),
    Int(i64),
    Bytes(&'a [u8]),
}

impl DiffEntry {
    pub fn string(original: impl Into<String>, replayed: impl Into<String>) -> Self {
        DiffEntry::Str {
            original: original.into(),
            replayed: replayed.into(),
        }
    }

    pub fn int(original: i64, replayed: i64) -> Self {
        DiffEntry::Int { original, replayed }
    }

    pub fn bytes(original: &[u8], replayed: &[u8]) -> Self {
        DiffEntry::Bytes {
            original: original.to_vec(),
            replayed: replayed.to_vec(),
        }
    }

    /// `"string"`, `"int"` or `"bytes"`.
    pub fn kind(&self) -> &'static str {
        match self {
            DiffEntry::Str { .. } => "string",
            DiffEntry::Int { .. } => "int",
            DiffEntry::Bytes { .. } => "bytes",
        }
    }

    /// `(original, replayed)`.
    pub fn values(&self) -> (DiffValue<'_>, DiffValue<'_>) {
        match self {
            DiffEntry::Str { original, replayed } => {
                (DiffValue::Str(original), DiffValue::Str(replayed))
            }
            DiffEntry::Int { original, replayed } => {
                (DiffValue::Int(*original), DiffValue::Int(*replayed))
            }
            DiffEntry::Bytes { original, replayed } => {
                (DiffValue::Bytes(original), DiffValue::Bytes(replayed))
            }
        }
    }
}

impl fmt::Display for DiffValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffValue::Str(s) => write!(f, "{s:?}"),
            DiffValue::Int(i) => write!(f, "{i}"),
            DiffValue::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "{s:?}"),
                Err(_) => write!(f, "0x{}", hex::encode(b)),
            },
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (original, replayed) = self.values();
        write!(f, "{original} -> {replayed}")
    }
}

/// UTF-8 bytes serialize as text, anything else as hex.
fn printable_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    match std::str::from_utf8(bytes) {
        Ok(s) => serializer.serialize_str(s),
        Err(_) => serializer.serialize_str(&hex::encode(bytes)),
    }
}

// ── DiffResult ───────────────────────────────────────────────────

/// All differences found for one request, keyed by field name.
///
/// Empty means the two responses are considered the same.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DiffResult {
    entries: BTreeMap<String, DiffEntry>,
}

impl DiffResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, entry: DiffEntry) {
        self.entries.insert(field.into(), entry);
    }

    pub fn get(&self, field: &str) -> Option<&DiffEntry> {
        self.entries.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DiffEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (field, entry)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {entry}")?;
        }
        f.write_str("}")
    }
}
