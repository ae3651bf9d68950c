//! Terminal render snapshot: the whole document plus peer presence,
//! redrawn from scratch on every refresh.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use synctext_core::update::Change;
use synctext_ipc::{Mailbox, PeerEntry};

const RULE: &str = "----------------------------------------";

/// Everything one refresh needs. Peers are expected to be pre-filtered
/// to displayable entries (see [`displayable_peers`]).
pub struct Snapshot<'a> {
    pub doc_name: &'a str,
    pub lines: &'a [String],
    pub peers: &'a [&'a PeerEntry],
    pub last_change: Option<&'a Change>,
    pub last_sender: Option<&'a str>,
}

/// Registry entries are best-effort; only peers whose mailbox can be
/// opened for sending right now are shown. Stale entries stay in the
/// registry but drop out of the display.
pub fn displayable_peers(peers: &[PeerEntry]) -> Vec<&PeerEntry> {
    peers
        .iter()
        .filter(|p| !p.queue_name.is_empty() && Mailbox::probe(&p.queue_name))
        .collect()
}

/// Render the snapshot into a screen-clearing escape-coded string.
pub fn render_to_string(snap: &Snapshot<'_>) -> String {
    let mut out = String::new();
    out.push_str("\x1b[2J\x1b[H");
    out.push_str(&format!("Document: {}\n", snap.doc_name));
    out.push_str(&format!("Last updated: {}\n", hms_now()));
    out.push_str(RULE);
    out.push('\n');

    for (i, line) in snap.lines.iter().enumerate() {
        out.push_str(&format!("Line {i}: {line}"));
        if snap.last_change.is_some_and(|c| c.line as usize == i) {
            out.push_str(" [MODIFIED]");
        }
        out.push('\n');
    }

    out.push_str(RULE);
    out.push('\n');
    out.push_str("Active users: ");
    if snap.peers.is_empty() {
        out.push_str("(none)");
    } else {
        let ids: Vec<&str> = snap.peers.iter().map(|p| p.user_id.as_str()).collect();
        out.push_str(&ids.join(", "));
    }
    out.push('\n');

    if let Some(c) = snap.last_change {
        out.push_str(&format!(
            "Change detected: Line {}, col {}-{}, \"{}\" → \"{}\", timestamp: {}\n",
            c.line,
            c.cs,
            c.ce,
            c.old_text,
            c.new_text,
            hms_from_ns(c.ts),
        ));
    }

    if let Some(sender) = snap.last_sender {
        out.push_str(&format!("Received update from {sender}\n"));
    }

    out.push_str("Monitoring for changes...\n");
    out
}

/// Render to stdout.
pub fn render(snap: &Snapshot<'_>) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(render_to_string(snap).as_bytes());
    let _ = stdout.flush();
}

/// Current wall clock as `HH:MM:SS` (UTC).
pub fn hms_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    hms_from_secs(secs)
}

/// Nanosecond timestamp as `HH:MM:SS` (UTC).
pub fn hms_from_ns(ns: u64) -> String {
    hms_from_secs(ns / 1_000_000_000)
}

fn hms_from_secs(epoch_secs: u64) -> String {
    let day = epoch_secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3_600, (day % 3_600) / 60, day % 60)
}
