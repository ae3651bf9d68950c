//! Update record model shared by the change detector and the merge engine.
//!
//! Columns are character indices. `col_end` is inclusive when `old_text`
//! is non-empty; a pure insertion has `col_start == col_end` marking the
//! insertion point.

use std::time::{SystemTime, UNIX_EPOCH};

/// Hard cap on line indices an update may reference. Lines are
/// auto-extended on apply up to this index; survivors beyond it are
/// discarded.
pub const MAX_LINES: u32 = 65_536;

/// Kind of edit carried by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpKind {
    Insert = 1,
    Delete = 2,
    Replace = 3,
}

impl OpKind {
    /// Convert from the wire discriminant. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Insert),
            2 => Some(Self::Delete),
            3 => Some(Self::Replace),
            _ => None,
        }
    }

    /// Human-readable operation name for the render snapshot.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Replace => "replace",
        }
    }
}

/// In-memory update: one minimal-span edit on one line.
///
/// Derived either from a local change or from an inbound wire record.
/// Text fields are unbounded here; the wire form truncates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateExt {
    /// Timestamp in nanoseconds; the only LWW ordering key.
    pub ts: u64,
    /// Originating participant id; LWW tie-break key.
    pub uid: String,
    pub line: u32,
    /// First affected column (inclusive).
    pub cs: i32,
    /// Last affected column (inclusive); `cs` for pure insertions.
    pub ce: i32,
    pub op: OpKind,
    /// Segment replaced; empty for insertions.
    pub old_text: String,
    /// Segment inserted; empty for deletions.
    pub new_text: String,
}

/// Change detector output: an [`UpdateExt`] in the making, kept as its
/// own type so the render layer can show the last change without
/// reaching into merge state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub line: u32,
    pub cs: i32,
    pub ce: i32,
    pub op: OpKind,
    pub old_text: String,
    pub new_text: String,
    pub uid: String,
    pub ts: u64,
}

impl Change {
    /// Human-readable operation name for the render snapshot.
    pub fn label(&self) -> &'static str {
        self.op.label()
    }

    pub fn to_update(&self) -> UpdateExt {
        UpdateExt {
            ts: self.ts,
            uid: self.uid.clone(),
            line: self.line,
            cs: self.cs,
            ce: self.ce,
            op: self.op,
            old_text: self.old_text.clone(),
            new_text: self.new_text.clone(),
        }
    }
}

/// Wall-clock nanoseconds since the epoch, used as the LWW key.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
