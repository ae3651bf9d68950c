//! # synctext-ipc — Process-shared substrate for synctext peers
//!
//! Everything that crosses a process boundary lives here: the shared
//! participant registry, the per-peer mailbox queues, the fixed-size
//! wire record they carry, and the in-process ring that hands received
//! records from the listener to the editor loop.
//!
//! ## Architecture
//!
//! ```text
//!            ┌────────────────────────────┐
//!            │  /synctext_registry (shm)  │   lock-free slot claim
//!            │  magic · version · 5 slots │◄── register / unregister
//!            └────────────┬───────────────┘
//!                         │ list()
//!                         ▼
//! peer A ──UpdateMessage──► /queue_B (POSIX mq, cap 10) ──► peer B
//!                                                 │
//!                                        listener task (blocking)
//!                                                 │ push
//!                                                 ▼
//!                                   SPSC ring (cap 128, drop on full)
//!                                                 │ pop
//!                                                 ▼
//!                                           editor loop
//! ```
//!
//! ## Modules
//!
//! - [`wire`] — fixed-size `#[repr(C)]` [`wire::UpdateMessage`] record
//! - [`registry`] — shared-memory participant registry with CAS claim
//! - [`mailbox`] — named bounded POSIX message queues
//! - [`ring`] — single-producer single-consumer receive ring
//!
//! Loss is tolerated end to end: a full mailbox skips the peer for the
//! round, a full ring drops the record, and last-writer-wins at the
//! merge layer subsumes whatever a later update from the same peer
//! carries.

pub mod mailbox;
pub mod registry;
pub mod ring;
pub mod wire;

pub use mailbox::{queue_name, Mailbox, MailboxError, MSG_MAX};
pub use registry::{PeerEntry, Registry, RegistryError, MAX_USERS, REGISTRY_NAME};
pub use ring::{ring, RingConsumer, RingProducer, RING_CAPACITY};
pub use wire::{UpdateMessage, QUEUE_NAME_MAX, TEXT_SEG_MAX, USER_ID_MAX, WIRE_SIZE};
