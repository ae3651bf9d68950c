//! Mailbox listener: blocking receive loop feeding the receive ring.
//!
//! Runs on a blocking thread (`tokio::task::spawn_blocking`); the
//! editor loop consumes from the other end of the ring. Ring overflow
//! drops the record, and LWW at the merge layer subsumes the loss.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use synctext_ipc::{Mailbox, RingProducer};

/// Receive until the running flag drops, then hand the mailbox back to
/// the caller for close/unlink.
pub fn run_listener(
    mailbox: Mailbox,
    mut ring: RingProducer,
    running: Arc<AtomicBool>,
    idle_backoff: Duration,
    error_backoff: Duration,
) -> Mailbox {
    while running.load(Ordering::Relaxed) {
        match mailbox.recv() {
            Ok(Some(msg)) => {
                if !ring.push(msg) {
                    log::debug!("receive ring full; dropping record");
                }
            }
            Ok(None) => std::thread::sleep(idle_backoff),
            Err(e) => {
                log::warn!("listener receive failed: {e}");
                std::thread::sleep(error_backoff);
            }
        }
    }
    log::info!("listener stopped");
    mailbox
}
