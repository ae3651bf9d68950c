//! Shared-memory participant registry with lock-free slot claim.
//!
//! The segment lives at [`REGISTRY_NAME`] and persists across peer
//! lifetimes. Slots are claimed with an atomic compare-and-swap on a
//! per-slot status word; the string fields are written only after a
//! successful claim and read by peers without locking. Readers must
//! tolerate torn string transients; the editor validates entries by
//! probing the advertised mailbox before trusting them for display.
//!
//! Crash without unregister leaks the slot until externally cleared;
//! the mailbox probe keeps such entries out of the displayed peer list.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicI32, Ordering};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd;
use static_assertions::const_assert_eq;
use thiserror::Error;

use crate::wire::{QUEUE_NAME_MAX, USER_ID_MAX};

/// POSIX shared memory name of the registry segment.
pub const REGISTRY_NAME: &str = "/synctext_registry";

/// Maximum concurrently registered participants.
pub const MAX_USERS: usize = 5;

const REGISTRY_MAGIC: u32 = 0x5359_5854; // "SYXT"
const REGISTRY_VERSION: u32 = 1;

const SLOT_FREE: i32 = 0;
const SLOT_TAKEN: i32 = 1;

/// One participant slot. The status word is the only synchronized
/// field; strings ride behind the claim.
#[repr(C)]
struct UserSlot {
    active: AtomicI32,
    user_id: [u8; USER_ID_MAX],
    queue_name: [u8; QUEUE_NAME_MAX],
}

/// Registry segment layout. Version gates future layout changes.
#[repr(C)]
struct RegistrySegment {
    magic: u32,
    version: u32,
    users: [UserSlot; MAX_USERS],
}

const SEGMENT_SIZE: usize = std::mem::size_of::<RegistrySegment>();
const_assert_eq!(SEGMENT_SIZE, 8 + MAX_USERS * (4 + USER_ID_MAX + QUEUE_NAME_MAX));

/// Best-effort snapshot of one taken slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub user_id: String,
    pub queue_name: String,
}

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("all {MAX_USERS} registry slots are taken")]
    NoSlots,

    #[error("user '{0}' is not registered")]
    NotFound(String),

    #[error("registry '{name}': {source}")]
    Os {
        name: String,
        #[source]
        source: Errno,
    },
}

/// Handle to the mapped registry segment.
///
/// Dropping unmaps the segment; the shared name is never unlinked (the
/// registry outlives any one peer).
pub struct Registry {
    seg: NonNull<RegistrySegment>,
    name: String,
    _fd: std::os::fd::OwnedFd,
}

// SAFETY: all cross-process access goes through the per-slot atomic
// status word; string fields are written only by the slot owner and
// read as best-effort snapshots.
unsafe impl Send for Registry {}
unsafe impl Sync for Registry {}

impl Registry {
    /// Open the shared registry, creating and zero-initializing it on
    /// first use. Idempotent across processes.
    pub fn open_or_create() -> Result<Self, RegistryError> {
        Self::open_or_create_at(REGISTRY_NAME)
    }

    /// Open a registry segment under an explicit shared-memory name.
    pub fn open_or_create_at(name: &str) -> Result<Self, RegistryError> {
        let os_err = |source| RegistryError::Os {
            name: name.to_string(),
            source,
        };

        let fd = mman::shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o666),
        )
        .map_err(os_err)?;

        unistd::ftruncate(&fd, SEGMENT_SIZE as nix::libc::off_t).map_err(os_err)?;

        let map_ptr = unsafe {
            mman::mmap(
                None,
                std::num::NonZeroUsize::new(SEGMENT_SIZE).expect("segment size is non-zero"),
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )
            .map_err(os_err)?
        };

        let registry = Self {
            seg: map_ptr.cast(),
            name: name.to_string(),
            _fd: fd,
        };

        // Fresh segments arrive zero-filled; a magic mismatch means
        // nobody initialized it yet. The write race between two first
        // openers is benign: both write identical values over zeroes.
        unsafe {
            let seg = registry.seg.as_ptr();
            if ptr::addr_of!((*seg).magic).read_volatile() != REGISTRY_MAGIC {
                for i in 0..MAX_USERS {
                    registry.clear_slot_text(i);
                    registry.slot_status(i).store(SLOT_FREE, Ordering::Release);
                }
                ptr::addr_of_mut!((*seg).version).write_volatile(REGISTRY_VERSION);
                ptr::addr_of_mut!((*seg).magic).write_volatile(REGISTRY_MAGIC);
            }
        }

        Ok(registry)
    }

    /// Remove a registry segment name entirely. Test and operator
    /// tooling only; peers never unlink the shared registry.
    pub fn unlink_at(name: &str) -> Result<(), RegistryError> {
        mman::shm_unlink(name).map_err(|source| RegistryError::Os {
            name: name.to_string(),
            source,
        })
    }

    /// Claim a slot for `user_id`, or refresh the queue name when the
    /// id is already registered. Returns the slot index.
    pub fn register(&self, user_id: &str, queue_name: &str) -> Result<usize, RegistryError> {
        // Same-id re-register: adopt the existing slot.
        for i in 0..MAX_USERS {
            if self.slot_status(i).load(Ordering::Acquire) == SLOT_TAKEN
                && self.read_slot_user(i) == user_id
            {
                self.write_slot_text(i, None, Some(queue_name));
                return Ok(i);
            }
        }

        // Atomic claim on the first free status word; strings are
        // written only after the CAS succeeds.
        for i in 0..MAX_USERS {
            if self
                .slot_status(i)
                .compare_exchange(SLOT_FREE, SLOT_TAKEN, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.write_slot_text(i, Some(user_id), Some(queue_name));
                return Ok(i);
            }
        }

        Err(RegistryError::NoSlots)
    }

    /// Release the slot held by `user_id`. Text fields are cleared
    /// before the status word is released.
    pub fn unregister(&self, user_id: &str) -> Result<(), RegistryError> {
        for i in 0..MAX_USERS {
            if self.slot_status(i).load(Ordering::Acquire) == SLOT_TAKEN
                && self.read_slot_user(i) == user_id
            {
                self.clear_slot_text(i);
                self.slot_status(i).store(SLOT_FREE, Ordering::Release);
                return Ok(());
            }
        }
        Err(RegistryError::NotFound(user_id.to_string()))
    }

    /// Best-effort snapshot of all taken slots. Entries may be torn
    /// mid-claim; callers validate via the mailbox probe before use.
    pub fn list(&self) -> Vec<PeerEntry> {
        let mut entries = Vec::with_capacity(MAX_USERS);
        for i in 0..MAX_USERS {
            if self.slot_status(i).load(Ordering::Acquire) != SLOT_TAKEN {
                continue;
            }
            let user_id = self.read_slot_user(i);
            if user_id.is_empty() {
                continue;
            }
            entries.push(PeerEntry {
                user_id,
                queue_name: self.read_slot_queue(i),
            });
        }
        entries
    }

    /// Shared-memory name this handle is mapped to.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn slot_status(&self, i: usize) -> &AtomicI32 {
        // SAFETY: the mapping is valid for the lifetime of self and the
        // atomic is shared by design.
        unsafe { &(*self.seg.as_ptr()).users[i].active }
    }

    fn read_slot_user(&self, i: usize) -> String {
        unsafe {
            let src = ptr::addr_of!((*self.seg.as_ptr()).users[i].user_id);
            read_fixed_str(&src.read_volatile())
        }
    }

    fn read_slot_queue(&self, i: usize) -> String {
        unsafe {
            let src = ptr::addr_of!((*self.seg.as_ptr()).users[i].queue_name);
            read_fixed_str(&src.read_volatile())
        }
    }

    fn write_slot_text(&self, i: usize, user_id: Option<&str>, queue_name: Option<&str>) {
        unsafe {
            let slot = ptr::addr_of_mut!((*self.seg.as_ptr()).users[i]);
            if let Some(uid) = user_id {
                write_fixed_str(ptr::addr_of_mut!((*slot).user_id), uid);
            }
            if let Some(q) = queue_name {
                write_fixed_str(ptr::addr_of_mut!((*slot).queue_name), q);
            }
        }
    }

    fn clear_slot_text(&self, i: usize) {
        self.write_slot_text(i, Some(""), Some(""));
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        // SAFETY: mapped in open_or_create_at with SEGMENT_SIZE and not
        // unmapped elsewhere.
        unsafe {
            let _ = mman::munmap(self.seg.cast(), SEGMENT_SIZE);
        }
    }
}

fn read_fixed_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Write a NUL-terminated, capacity-truncated string into a fixed slot
/// field through the shared mapping.
///
/// # Safety
///
/// `dst` must point into the live mapping and be valid for `N` bytes.
unsafe fn write_fixed_str<const N: usize>(dst: *mut [u8; N], s: &str) {
    let mut buf = [0u8; N];
    let mut take = s.len().min(N - 1);
    while take > 0 && !s.is_char_boundary(take) {
        take -= 1;
    }
    buf[..take].copy_from_slice(&s.as_bytes()[..take]);
    dst.write_volatile(buf);
}
