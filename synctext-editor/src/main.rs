//! synctext peer binary: register, listen, edit, merge, broadcast.
//!
//! One process per participant. The main task runs the editor loop;
//! a blocking task runs the mailbox listener; Ctrl-C or SIGTERM flips
//! the shared running flag and both tasks exit at their next wakeup,
//! after which the slot, mailbox, and mapping are released in reverse
//! order of acquisition.

mod config;
mod editor;
mod listener;
mod render;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};
use synctext_ipc::{queue_name, Mailbox, Registry, RegistryError};

use config::EditorConfig;
use editor::Editor;

// Exit codes.
const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 1;
const EXIT_INIT: i32 = 2;
const EXIT_REGISTRY_FULL: i32 = 3;
const EXIT_DOC: i32 = 4;

#[tokio::main]
async fn main() {
    env_logger::init();
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let mut args = std::env::args();
    let prog = args.next().unwrap_or_else(|| "synctext-editor".into());
    let user_id = match (args.next(), args.next()) {
        (Some(uid), None) => uid,
        _ => {
            eprintln!("Usage: {prog} <user_id>");
            return EXIT_USAGE;
        }
    };
    // The id names the mailbox and the document file.
    if user_id.is_empty() || user_id.contains('/') {
        eprintln!("user_id must be non-empty and contain no '/'");
        return EXIT_USAGE;
    }

    let registry = match Registry::open_or_create() {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!("failed to open registry: {e}");
            return EXIT_INIT;
        }
    };

    // The mailbox exists before the registry entry advertises it, so
    // peers never see an entry whose queue cannot be opened.
    let mailbox = match Mailbox::create(&user_id) {
        Ok(mb) => mb,
        Err(e) => {
            error!("failed to create mailbox: {e}");
            return EXIT_INIT;
        }
    };

    match registry.register(&user_id, &queue_name(&user_id)) {
        Ok(slot) => info!("registered as {user_id} (slot {slot})"),
        Err(RegistryError::NoSlots) => {
            error!("registry is full");
            let _ = mailbox.close();
            let _ = Mailbox::unlink(&user_id);
            return EXIT_REGISTRY_FULL;
        }
        Err(e) => {
            error!("registration failed: {e}");
            let _ = mailbox.close();
            let _ = Mailbox::unlink(&user_id);
            return EXIT_INIT;
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let (producer, consumer) = synctext_ipc::ring();

    let cfg = EditorConfig::default();
    let mut editor = match Editor::bootstrap(
        cfg.clone(),
        user_id.clone(),
        registry.clone(),
        consumer,
        running.clone(),
    ) {
        Ok(ed) => ed,
        Err(e) => {
            error!("document unavailable: {e}");
            let _ = registry.unregister(&user_id);
            let _ = mailbox.close();
            let _ = Mailbox::unlink(&user_id);
            return EXIT_DOC;
        }
    };

    let listener_handle = {
        let running = running.clone();
        let idle = cfg.listener_idle_backoff;
        let err_backoff = cfg.listener_error_backoff;
        tokio::task::spawn_blocking(move || {
            listener::run_listener(mailbox, producer, running, idle, err_backoff)
        })
    };

    {
        let running = running.clone();
        tokio::spawn(async move {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        error!("cannot install SIGTERM handler: {e}");
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            info!("shutdown requested");
            running.store(false, Ordering::Relaxed);
        });
    }

    editor.run().await;

    drop(editor);

    // Teardown mirrors startup: slot, then mailbox handle, then the
    // mailbox name, then the registry mapping. Every step tolerates a
    // partially torn-down peer.
    if let Err(e) = registry.unregister(&user_id) {
        log::warn!("unregister failed: {e}");
    }
    match listener_handle.await {
        Ok(mailbox) => {
            if let Err(e) = mailbox.close() {
                log::warn!("mailbox close failed: {e}");
            }
        }
        Err(e) => log::warn!("listener join failed: {e}"),
    }
    if let Err(e) = Mailbox::unlink(&user_id) {
        log::warn!("mailbox unlink failed: {e}");
    }

    info!("goodbye");
    EXIT_OK
}
