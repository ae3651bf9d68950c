//! The per-tick editor loop.
//!
//! Tick order, each pass:
//!
//! 1. snapshot registry peers
//! 2. drain the receive ring (self-sent records filtered out)
//! 3. poll the document mtime; detect local changes on movement
//! 4. merge when remote updates are buffered or enough local edits
//!    accumulated, unless the file is mid-edit; rewrite on success
//! 5. re-drain for late arrivals and possibly merge again
//! 6. broadcast queued local operations once enough accumulated
//! 7. sleep
//!
//! Merging runs before broadcasting in the same tick so reconciled
//! local state is on disk before any of it goes out; queued local ops
//! are still broadcast as emitted and the remote side's LWW resolves
//! them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use synctext_core::document::{self, DocError};
use synctext_core::update::{Change, UpdateExt};
use synctext_core::{detect_changes, merge_apply};
use synctext_ipc::{Mailbox, Registry, RingConsumer, UpdateMessage};

use crate::config::EditorConfig;
use crate::render::{self, Snapshot};

/// All loop state for one peer. Shares the registry mapping with the
/// teardown path and owns the consumer half of the receive ring; the
/// listener owns the mailbox.
pub struct Editor {
    cfg: EditorConfig,
    uid: String,
    doc_path: PathBuf,
    doc_name: String,
    registry: Arc<Registry>,
    ring: RingConsumer,
    running: Arc<AtomicBool>,

    /// Last file state we have seen (post-detection).
    prev_lines: Vec<String>,
    /// Starting point for the next merge; reset after each merge write.
    merge_baseline: Vec<String>,
    last_mtime: SystemTime,

    /// Wire-form operations queued for broadcast.
    local_ops: Vec<UpdateMessage>,
    /// Local updates awaiting merge.
    local_unmerged: Vec<UpdateExt>,
    /// Remote updates awaiting merge.
    recv_unmerged: Vec<UpdateExt>,

    last_change: Option<Change>,
    last_sender: Option<String>,
    peer_count: usize,
}

impl Editor {
    /// Seed and load the document, returning a ready loop state.
    pub fn bootstrap(
        cfg: EditorConfig,
        uid: String,
        registry: Arc<Registry>,
        ring: RingConsumer,
        running: Arc<AtomicBool>,
    ) -> Result<Self, DocError> {
        let doc_path = cfg
            .doc_path
            .clone()
            .unwrap_or_else(|| document::doc_path(&uid));
        document::seed_if_absent(&doc_path)?;
        let last_mtime = document::modified_at(&doc_path)?;
        let prev_lines = document::read_lines(&doc_path)?;

        Ok(Self {
            doc_name: doc_path.display().to_string(),
            merge_baseline: prev_lines.clone(),
            cfg,
            uid,
            doc_path,
            registry,
            ring,
            running,
            prev_lines,
            last_mtime,
            local_ops: Vec::new(),
            local_unmerged: Vec::new(),
            recv_unmerged: Vec::new(),
            last_change: None,
            last_sender: None,
            peer_count: 0,
        })
    }

    /// Run ticks until the shared running flag drops.
    pub async fn run(&mut self) {
        self.refresh_display();
        while self.running.load(Ordering::Relaxed) {
            self.tick().await;
            tokio::time::sleep(self.cfg.poll_interval).await;
        }
    }

    async fn tick(&mut self) {
        let peer_count = self.registry.list().len();
        let users_changed = peer_count != self.peer_count;
        self.peer_count = peer_count;

        let got_remote = self.drain_ring();
        if got_remote {
            if let Some(sender) = &self.last_sender {
                println!("Received update from {sender}");
            }
            self.refresh_display();
        } else if users_changed {
            self.refresh_display();
        }

        let mtime = match document::modified_at(&self.doc_path) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("skipping tick: {e}");
                return;
            }
        };

        // A merge write never lands here: merge_and_write records the
        // post-write mtime, so any movement is a user edit (possibly
        // typed during the settle window) and must be detected.
        if mtime != self.last_mtime {
            self.last_mtime = mtime;
            self.detect_local_changes();
        }

        let should_merge = !self.recv_unmerged.is_empty()
            || self.local_unmerged.len() >= self.cfg.merge_threshold;
        if should_merge && !self.file_dirty() && self.merge_and_write() {
            tokio::time::sleep(self.cfg.merge_settle).await;
        }

        // Late-arrival sweep: records that landed during the merge get
        // reconciled against the fresh baseline right away.
        if self.drain_ring() && !self.file_dirty() {
            self.merge_and_write();
        }

        if self.local_ops.len() >= self.cfg.broadcast_threshold {
            self.broadcast();
        }
    }

    /// Pull everything out of the receive ring, skipping records this
    /// peer sent itself. Returns whether any remote record arrived.
    fn drain_ring(&mut self) -> bool {
        let mut got = false;
        while let Some(msg) = self.ring.pop() {
            let sender = msg.sender_str();
            if sender == self.uid {
                continue;
            }
            self.recv_unmerged.push(msg.to_update());
            self.last_sender = Some(sender);
            got = true;
        }
        got
    }

    /// Diff the file against the last known state; queue each change
    /// for both merge and broadcast.
    fn detect_local_changes(&mut self) {
        let new_lines = match document::read_lines(&self.doc_path) {
            Ok(lines) => lines,
            Err(e) => {
                log::warn!("document read failed: {e}");
                return;
            }
        };

        let mut changes = detect_changes(&self.prev_lines, &new_lines, &self.uid);
        self.prev_lines = new_lines;
        if changes.is_empty() {
            return;
        }

        for change in &changes {
            let update = change.to_update();
            self.local_ops.push(UpdateMessage::from_update(&update));
            self.local_unmerged.push(update);
        }
        self.last_change = changes.pop();
        self.refresh_display();
    }

    /// Whether the file moved under us since the last recorded mtime
    /// (local edits in flight; merging now would clobber them).
    fn file_dirty(&self) -> bool {
        match document::modified_at(&self.doc_path) {
            Ok(t) => t != self.last_mtime,
            Err(_) => true,
        }
    }

    /// Merge buffered updates against the baseline and rewrite the
    /// document on change. Both update buffers are consumed either way.
    fn merge_and_write(&mut self) -> bool {
        let mut merged = self.merge_baseline.clone();
        let changed = merge_apply(
            &mut merged,
            &self.local_unmerged,
            &self.recv_unmerged,
            &self.uid,
        );
        self.local_unmerged.clear();
        self.recv_unmerged.clear();
        if !changed {
            return false;
        }

        while merged.last().is_some_and(|l| l.is_empty()) {
            merged.pop();
        }
        if let Err(e) = document::write_lines(&self.doc_path, &merged) {
            log::error!("merge write failed: {e}");
            return false;
        }

        self.prev_lines = merged.clone();
        self.merge_baseline = merged;
        // Mtime is recorded after the write so the next poll does not
        // re-detect our own rewrite as a user edit. If the stat fails,
        // the next detection diffs the written content against an
        // identical prev_lines and emits nothing.
        match document::modified_at(&self.doc_path) {
            Ok(t) => self.last_mtime = t,
            Err(e) => log::warn!("mtime refresh after merge failed: {e}"),
        }

        println!("All updates merged successfully");
        self.refresh_display();
        true
    }

    /// Send the oldest queued operations to every other active peer.
    /// A full or vanished mailbox abandons that peer for this round.
    fn broadcast(&mut self) {
        let n = self.cfg.broadcast_threshold.min(self.local_ops.len());
        log::info!("broadcasting {n} operations");

        for peer in self.registry.list() {
            if peer.user_id == self.uid || peer.queue_name.is_empty() {
                continue;
            }
            let mailbox = match Mailbox::open_for_send(&peer.queue_name) {
                Ok(mb) => mb,
                Err(e) => {
                    log::debug!("skipping peer {}: {e}", peer.user_id);
                    continue;
                }
            };
            for op in &self.local_ops[..n] {
                if let Err(e) = mailbox.send(op) {
                    log::debug!("stopped sending to {}: {e}", peer.user_id);
                    break;
                }
            }
            if let Err(e) = mailbox.close() {
                log::debug!("closing sender to {} failed: {e}", peer.user_id);
            }
        }

        self.local_ops.drain(..n);
    }

    fn refresh_display(&self) {
        let peers = self.registry.list();
        let displayable = render::displayable_peers(&peers);
        render::render(&Snapshot {
            doc_name: &self.doc_name,
            lines: &self.prev_lines,
            peers: &displayable,
            last_change: self.last_change.as_ref(),
            last_sender: self.last_sender.as_deref(),
        });
    }
}
