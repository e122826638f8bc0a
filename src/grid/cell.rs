//! Cell values and the per-cell status metadata kept in the grid side-table.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// CellValue
// ─────────────────────────────────────────────────────────────────────────────

/// A single grid cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Returns true for `Null` and for empty text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Converts to the JSON scalar sent to the server.
    ///
    /// Whole numbers are emitted as integers so `3` does not travel as `3.0`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Key used for duplicate comparison. Text compares case-insensitively.
    /// Returns `None` for blank cells, which never match anything.
    pub(crate) fn match_key(&self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        match self {
            CellValue::Text(s) => Some(s.trim().to_lowercase()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CellTag / CellTags
// ─────────────────────────────────────────────────────────────────────────────

/// A status marker attached to one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellTag {
    /// Edited by the user since the last reset.
    Modified,
    /// Edited after a server rejection; awaiting re-validation.
    Pending,
    /// Rejected by the server.
    Invalid,
    /// Accepted by the server.
    Success,
    /// Reported by the server as already existing.
    DuplicateServer,
    /// Matches another loaded row on the key columns (advisory).
    DuplicateLocal,
}

impl CellTag {
    const ALL: [CellTag; 6] = [
        CellTag::Modified,
        CellTag::Pending,
        CellTag::Invalid,
        CellTag::Success,
        CellTag::DuplicateServer,
        CellTag::DuplicateLocal,
    ];

    pub fn flag(self) -> CellTags {
        match self {
            CellTag::Modified => CellTags::MODIFIED,
            CellTag::Pending => CellTags::PENDING,
            CellTag::Invalid => CellTags::INVALID,
            CellTag::Success => CellTags::SUCCESS,
            CellTag::DuplicateServer => CellTags::DUPLICATE_SERVER,
            CellTag::DuplicateLocal => CellTags::DUPLICATE_LOCAL,
        }
    }

    /// Whether this tag sits on the success/duplicate/invalid axis.
    pub fn is_outcome(self) -> bool {
        CellTags::OUTCOME.contains(self.flag())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CellTag::Modified => "modified",
            CellTag::Pending => "pending",
            CellTag::Invalid => "invalid",
            CellTag::Success => "success",
            CellTag::DuplicateServer => "duplicate-server",
            CellTag::DuplicateLocal => "duplicate-local",
        }
    }
}

bitflags::bitflags! {
    /// Tags set on one cell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[repr(transparent)]
    pub struct CellTags: u8 {
        const MODIFIED = 1 << 0;
        const PENDING = 1 << 1;
        const INVALID = 1 << 2;
        const SUCCESS = 1 << 3;
        const DUPLICATE_SERVER = 1 << 4;
        const DUPLICATE_LOCAL = 1 << 5;
        /// At most one of these is set at a time.
        const OUTCOME = Self::INVALID.bits()
            | Self::SUCCESS.bits()
            | Self::DUPLICATE_SERVER.bits();
    }
}

impl CellTags {
    pub fn has(self, tag: CellTag) -> bool {
        self.contains(tag.flag())
    }

    /// Sets `tag`, clearing any other outcome first.
    pub fn add(&mut self, tag: CellTag) {
        if tag.is_outcome() {
            self.remove(Self::OUTCOME);
        }
        self.insert(tag.flag());
    }

    pub fn discard(&mut self, tag: CellTag) {
        self.remove(tag.flag());
    }

    /// The outcome tag currently set, if any.
    pub fn outcome(self) -> Option<CellTag> {
        self.tags().find(|t| t.is_outcome())
    }

    pub fn tags(self) -> impl Iterator<Item = CellTag> {
        CellTag::ALL.into_iter().filter(move |t| self.has(*t))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CellMeta
// ─────────────────────────────────────────────────────────────────────────────

/// Rendering override for a single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellRenderer {
    /// Offer these values as completions while editing.
    Autocomplete(Vec<String>),
    /// Render the value as a hyperlink.
    Link,
}

/// Auxiliary state for one (row, col) position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellMeta {
    pub tags: CellTags,
    pub message: Option<String>,
    pub renderer: Option<CellRenderer>,
}

impl CellMeta {
    /// True when nothing worth keeping remains in the entry.
    pub(crate) fn is_vacant(&self) -> bool {
        self.tags.is_empty() && self.message.is_none() && self.renderer.is_none()
    }
}
