//! Per-participant mailboxes over POSIX message queues.
//!
//! Each peer owns the queue named after its id (`/queue_<user_id>`) and
//! receives from it; any peer may open it for sending. Sends and
//! receives are message-atomic and non-blocking; a full or vanished
//! queue is the sender's problem for that round only. The editor loop
//! never retries, LWW absorbs the loss.

use std::ffi::CString;

use nix::errno::Errno;
use nix::mqueue::{self, MQ_OFlag, MqAttr, MqdT};
use nix::sys::stat::Mode;
use thiserror::Error;

use crate::wire::{UpdateMessage, WIRE_SIZE};

/// Queue capacity in messages; within the default kernel msg_max.
pub const MSG_MAX: usize = 10;

/// Mailbox name for a participant: `/queue_<user_id>`. The caller
/// guarantees the id contains no path-disallowed characters.
pub fn queue_name(user_id: &str) -> String {
    format!("/queue_{user_id}")
}

/// Errors from mailbox operations.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// The receiver's queue is at capacity; the record was not enqueued.
    #[error("mailbox '{0}' is full")]
    Full(String),

    /// The queue no longer exists (peer exited and unlinked it).
    #[error("mailbox '{0}' is gone")]
    Gone(String),

    /// The name cannot be used as a queue name.
    #[error("invalid mailbox name '{0}'")]
    BadName(String),

    #[error("mailbox '{name}': {source}")]
    Os {
        name: String,
        #[source]
        source: Errno,
    },
}

/// Handle to one named message queue, owner side or sender side.
pub struct Mailbox {
    mqd: MqdT,
    name: String,
    /// Receive buffers must be at least the queue's msgsize.
    msg_size: usize,
}

impl Mailbox {
    /// Create (or recreate) the owner's receive queue. Any leftover
    /// queue under the same name from a crashed predecessor is
    /// unlinked first so the attributes are ours.
    pub fn create(user_id: &str) -> Result<Self, MailboxError> {
        let name = queue_name(user_id);
        let cname = to_cname(&name)?;
        let _ = mqueue::mq_unlink(cname.as_c_str());

        let attr = MqAttr::new(0, MSG_MAX as _, WIRE_SIZE as _, 0);
        let mqd = mqueue::mq_open(
            cname.as_c_str(),
            MQ_OFlag::O_CREAT | MQ_OFlag::O_RDONLY | MQ_OFlag::O_NONBLOCK,
            Mode::from_bits_truncate(0o666),
            Some(&attr),
        )
        .map_err(|source| MailboxError::Os {
            name: name.clone(),
            source,
        })?;

        log::info!("mailbox created: {name}");
        Ok(Self {
            mqd,
            name,
            msg_size: WIRE_SIZE,
        })
    }

    /// Open a peer's queue for sending. Doubles as the existence probe
    /// that decides whether a registry entry is displayable.
    pub fn open_for_send(name: &str) -> Result<Self, MailboxError> {
        let cname = to_cname(name)?;
        let mqd = mqueue::mq_open(
            cname.as_c_str(),
            MQ_OFlag::O_WRONLY | MQ_OFlag::O_NONBLOCK,
            Mode::empty(),
            None,
        )
        .map_err(|source| match source {
            Errno::ENOENT => MailboxError::Gone(name.to_string()),
            other => MailboxError::Os {
                name: name.to_string(),
                source: other,
            },
        })?;

        Ok(Self {
            mqd,
            name: name.to_string(),
            msg_size: WIRE_SIZE,
        })
    }

    /// Whether a queue currently exists and accepts senders.
    pub fn probe(name: &str) -> bool {
        match Self::open_for_send(name) {
            Ok(mb) => {
                let _ = mb.close();
                true
            }
            Err(_) => false,
        }
    }

    /// Non-blocking receive. `Ok(None)` when the queue is empty; short
    /// foreign records are dropped with a warning.
    pub fn recv(&self) -> Result<Option<UpdateMessage>, MailboxError> {
        let mut buf = vec![0u8; self.msg_size];
        let mut prio = 0u32;
        match mqueue::mq_receive(&self.mqd, &mut buf, &mut prio) {
            Ok(n) => match UpdateMessage::from_bytes(&buf[..n]) {
                Some(msg) => Ok(Some(msg)),
                None => {
                    log::warn!("mailbox {}: dropping short record ({n} bytes)", self.name);
                    Ok(None)
                }
            },
            Err(Errno::EAGAIN) => Ok(None),
            Err(source) => Err(MailboxError::Os {
                name: self.name.clone(),
                source,
            }),
        }
    }

    /// Non-blocking send of one record.
    pub fn send(&self, msg: &UpdateMessage) -> Result<(), MailboxError> {
        match mqueue::mq_send(&self.mqd, msg.as_bytes(), 0) {
            Ok(()) => Ok(()),
            Err(Errno::EAGAIN) => Err(MailboxError::Full(self.name.clone())),
            Err(Errno::EBADF) => Err(MailboxError::Gone(self.name.clone())),
            Err(source) => Err(MailboxError::Os {
                name: self.name.clone(),
                source,
            }),
        }
    }

    /// Close the descriptor. The name survives until [`Mailbox::unlink`].
    pub fn close(self) -> Result<(), MailboxError> {
        let name = self.name.clone();
        mqueue::mq_close(self.mqd).map_err(|source| MailboxError::Os { name, source })
    }

    /// Remove a queue name. Only the owning peer unlinks its mailbox,
    /// at shutdown.
    pub fn unlink(user_id: &str) -> Result<(), MailboxError> {
        let name = queue_name(user_id);
        let cname = to_cname(&name)?;
        mqueue::mq_unlink(cname.as_c_str()).map_err(|source| match source {
            Errno::ENOENT => MailboxError::Gone(name.clone()),
            other => MailboxError::Os {
                name: name.clone(),
                source: other,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn to_cname(name: &str) -> Result<CString, MailboxError> {
    CString::new(name).map_err(|_| MailboxError::BadName(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use synctext_core::update::{OpKind, UpdateExt};

    fn test_uid(case: &str) -> String {
        format!("mbtest_{}_{}", case, std::process::id())
    }

    fn sample_msg(sender: &str) -> UpdateMessage {
        UpdateMessage::from_update(&UpdateExt {
            ts: 42,
            uid: sender.to_string(),
            line: 0,
            cs: 1,
            ce: 1,
            op: OpKind::Insert,
            old_text: String::new(),
            new_text: "X".into(),
        })
    }

    #[test]
    fn test_queue_naming() {
        assert_eq!(queue_name("alice"), "/queue_alice");
    }

    #[test]
    fn test_create_send_recv_roundtrip() {
        let uid = test_uid("roundtrip");
        let owner = Mailbox::create(&uid).unwrap();
        let sender = Mailbox::open_for_send(&queue_name(&uid)).unwrap();

        sender.send(&sample_msg("peer")).unwrap();
        let got = owner.recv().unwrap().expect("one queued record");
        assert_eq!(got.sender_str(), "peer");
        assert_eq!(got.to_update().new_text, "X");

        sender.close().unwrap();
        owner.close().unwrap();
        Mailbox::unlink(&uid).unwrap();
    }

    #[test]
    fn test_recv_empty_is_none() {
        let uid = test_uid("empty");
        let owner = Mailbox::create(&uid).unwrap();
        assert!(owner.recv().unwrap().is_none());
        owner.close().unwrap();
        Mailbox::unlink(&uid).unwrap();
    }

    #[test]
    fn test_send_to_full_queue_fails_without_blocking() {
        let uid = test_uid("fullq");
        let owner = Mailbox::create(&uid).unwrap();
        let sender = Mailbox::open_for_send(&queue_name(&uid)).unwrap();

        let msg = sample_msg("p");
        for _ in 0..MSG_MAX {
            sender.send(&msg).unwrap();
        }
        assert!(matches!(sender.send(&msg), Err(MailboxError::Full(_))));

        sender.close().unwrap();
        owner.close().unwrap();
        Mailbox::unlink(&uid).unwrap();
    }

    #[test]
    fn test_open_for_send_missing_queue_is_gone() {
        let name = queue_name(&test_uid("missing"));
        assert!(matches!(
            Mailbox::open_for_send(&name),
            Err(MailboxError::Gone(_))
        ));
    }

    #[test]
    fn test_probe_reflects_existence() {
        let uid = test_uid("probe");
        let name = queue_name(&uid);
        assert!(!Mailbox::probe(&name));

        let owner = Mailbox::create(&uid).unwrap();
        assert!(Mailbox::probe(&name));

        owner.close().unwrap();
        Mailbox::unlink(&uid).unwrap();
        assert!(!Mailbox::probe(&name));
    }

    #[test]
    fn test_fifo_order_preserved() {
        let uid = test_uid("fifo");
        let owner = Mailbox::create(&uid).unwrap();
        let sender = Mailbox::open_for_send(&queue_name(&uid)).unwrap();

        for i in 0..3u64 {
            let mut msg = sample_msg("p");
            msg.timestamp_ns = i;
            sender.send(&msg).unwrap();
        }
        for i in 0..3u64 {
            assert_eq!(owner.recv().unwrap().unwrap().timestamp_ns, i);
        }

        sender.close().unwrap();
        owner.close().unwrap();
        Mailbox::unlink(&uid).unwrap();
    }

    #[test]
    fn test_bad_name_rejected() {
        assert!(matches!(
            Mailbox::open_for_send("/queue_\0evil"),
            Err(MailboxError::BadName(_))
        ));
    }

    #[test]
    fn test_create_replaces_leftover_queue() {
        let uid = test_uid("leftover");
        let first = Mailbox::create(&uid).unwrap();
        let sender = Mailbox::open_for_send(&queue_name(&uid)).unwrap();
        sender.send(&sample_msg("p")).unwrap();
        sender.close().unwrap();
        // Simulate a crash: descriptor leaks, queue name stays.
        std::mem::forget(first);

        let second = Mailbox::create(&uid).unwrap();
        // The stale record went away with the recreated queue.
        assert!(second.recv().unwrap().is_none());

        second.close().unwrap();
        Mailbox::unlink(&uid).unwrap();
    }
}
