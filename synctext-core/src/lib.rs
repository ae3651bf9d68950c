//! # synctext-core — Collaborative editing engine
//!
//! Pure engine behind the synctext peer: converts file-level edits into
//! structured update records and reconciles concurrent updates from
//! several peers into one converged line vector.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   read_lines    ┌──────────────┐
//! │ document.rs  │ ──────────────► │   diff.rs    │
//! │ (local file) │                 │ (change      │
//! └──────┬───────┘                 │  detector)   │
//!        │                         └──────┬───────┘
//!        │ baseline                       │ Change → UpdateExt
//!        ▼                                ▼
//! ┌─────────────────────────────────────────────┐
//! │                merge.rs                      │
//! │  coalesce chains → LWW conflict resolution   │
//! │  → group per line → apply with offsets       │
//! └─────────────────────┬───────────────────────┘
//!                       │ merged lines
//!                       ▼
//!               document::write_lines
//! ```
//!
//! ## Modules
//!
//! - [`update`] — update record model (`UpdateExt`, `Change`, `OpKind`)
//! - [`diff`] — minimal-span per-line change detector
//! - [`merge`] — chained-coalesce + last-writer-wins merge engine
//! - [`document`] — local document file: seed, read, write, mtime
//!
//! The engine is deterministic: two peers that feed the same update set
//! through [`merge::merge_apply`] end up with identical line vectors.

pub mod diff;
pub mod document;
pub mod merge;
pub mod update;

pub use diff::detect_changes;
pub use document::{doc_path, modified_at, read_lines, seed_if_absent, write_lines, DocError};
pub use merge::{apply_update_to_line, merge_apply, newer_wins, overlaps};
pub use update::{now_ns, Change, OpKind, UpdateExt, MAX_LINES};
