//! Fixed-size wire record exchanged between peers.
//!
//! Layout (`#[repr(C)]`, native endianness; single-host deployment):
//!
//! ```text
//! ┌────────┬──────────────┬──────┬──────────┬─────────┬────┬──────────┬──────────┐
//! │ sender │ timestamp_ns │ line │ col_start│ col_end │ op │ old_text │ new_text │
//! │ 32 B   │ 8 B          │ 4 B  │ 4 B      │ 4 B     │ 1B │ 256 B    │ 256 B    │
//! └────────┴──────────────┴──────┴──────────┴─────────┴────┴──────────┴──────────┘
//! ```
//!
//! Strings are NUL-terminated and truncated at capacity. The record is
//! sized to fit comfortably inside the default POSIX mqueue message
//! size (8192 bytes).

use std::mem::size_of;

use static_assertions::const_assert;
use synctext_core::update::{OpKind, UpdateExt};

/// Maximum participant id length, including the NUL terminator.
pub const USER_ID_MAX: usize = 32;
/// Maximum mailbox queue name length, including the NUL terminator.
pub const QUEUE_NAME_MAX: usize = 64;
/// Maximum text segment carried per update, including the NUL terminator.
pub const TEXT_SEG_MAX: usize = 256;

/// One edit on the wire. Field order and sizes are the protocol; do not
/// reorder.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct UpdateMessage {
    pub sender: [u8; USER_ID_MAX],
    pub timestamp_ns: u64,
    pub line: u32,
    pub col_start: i32,
    pub col_end: i32,
    pub op: u8,
    pub old_text: [u8; TEXT_SEG_MAX],
    pub new_text: [u8; TEXT_SEG_MAX],
}

/// Exact transport size of one record.
pub const WIRE_SIZE: usize = size_of::<UpdateMessage>();

// 32 + 8 + 4 + 4 + 4 + 1 + 256 + 256 = 565, rounded up to u64 alignment.
const_assert!(WIRE_SIZE == 568);
const_assert!(WIRE_SIZE < 8192);

/// Copy `s` into a NUL-terminated fixed buffer, truncating on a UTF-8
/// boundary when it does not fit.
fn pack_str(dst: &mut [u8], s: &str) {
    let cap = dst.len() - 1;
    let mut take = s.len().min(cap);
    while take > 0 && !s.is_char_boundary(take) {
        take -= 1;
    }
    dst[..take].copy_from_slice(&s.as_bytes()[..take]);
    dst[take] = 0;
}

/// Read a NUL-terminated fixed buffer back into an owned string.
fn unpack_str(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

impl UpdateMessage {
    /// Build a wire record from an in-memory update. Text beyond the
    /// segment capacity is truncated.
    pub fn from_update(u: &UpdateExt) -> Self {
        // Start from all-zero bytes so struct padding never leaks
        // uninitialized memory through as_bytes().
        // SAFETY: every field of UpdateMessage is an integer or byte
        // array; all-zeros is a valid value.
        let mut msg: Self = unsafe { std::mem::zeroed() };
        msg.timestamp_ns = u.ts;
        msg.line = u.line;
        msg.col_start = u.cs;
        msg.col_end = u.ce;
        msg.op = u.op as u8;
        pack_str(&mut msg.sender, &u.uid);
        pack_str(&mut msg.old_text, &u.old_text);
        pack_str(&mut msg.new_text, &u.new_text);
        msg
    }

    /// Decode back into an in-memory update. An unknown op discriminant
    /// is treated as a replace rather than an error.
    pub fn to_update(&self) -> UpdateExt {
        UpdateExt {
            ts: self.timestamp_ns,
            uid: self.sender_str(),
            line: self.line,
            cs: self.col_start,
            ce: self.col_end,
            op: OpKind::from_u8(self.op).unwrap_or(OpKind::Replace),
            old_text: unpack_str(&self.old_text),
            new_text: unpack_str(&self.new_text),
        }
    }

    pub fn sender_str(&self) -> String {
        unpack_str(&self.sender)
    }

    /// View the record as transport bytes.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: UpdateMessage is repr(C) with no interior pointers,
        // and construction zero-initializes the whole struct, padding
        // included, before fields are written.
        unsafe { std::slice::from_raw_parts(self as *const Self as *const u8, WIRE_SIZE) }
    }

    /// Reconstruct a record from transport bytes. Returns `None` when
    /// the buffer is short (a partial record cannot occur on a healthy
    /// queue; it means a foreign writer).
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < WIRE_SIZE {
            return None;
        }
        // SAFETY: length checked above; every bit pattern is a valid
        // UpdateMessage (op is validated lazily in to_update).
        Some(unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const Self) })
    }
}
