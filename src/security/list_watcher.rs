//! File watcher for hot-reloading access lists.
//!
//! `notify` delivers events on its own thread; they are classified and
//! forwarded over a channel to a Tokio task that debounces bursts of writes
//! into a single reload. A rename or delete closes the watcher and re-runs
//! list initialization, which falls back to the static list when the file
//! is gone.

use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::security::access_control::{HostAccessControl, ListKind, ListSource};

/// Delay between the first change event and the reload.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileEvent {
    Changed,
    Gone,
}

fn classify(event: &Event) -> Option<FileEvent> {
    match event.kind {
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => Some(FileEvent::Gone),
        EventKind::Create(_) | EventKind::Modify(_) => Some(FileEvent::Changed),
        _ => None,
    }
}

fn start_watcher(
    path: &Path,
    tx: mpsc::UnboundedSender<FileEvent>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Some(file_event) = classify(&event) {
                    let _ = tx.send(file_event);
                }
            }
            Err(e) => tracing::error!("Watch error: {:?}", e),
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;

    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Spawn the watch loop for one list.
///
/// The task ends when `shutdown` fires, when the owning
/// [`HostAccessControl`] is dropped, or when the file disappears and the list
/// has fallen back to its static contents.
pub fn spawn(
    acl: Weak<HostAccessControl>,
    kind: ListKind,
    path: PathBuf,
    shutdown: broadcast::Receiver<()>,
    debounce: Duration,
) -> JoinHandle<()> {
    tokio::spawn(run(acl, kind, path, shutdown, debounce))
}

async fn run(
    acl: Weak<HostAccessControl>,
    kind: ListKind,
    path: PathBuf,
    mut shutdown: broadcast::Receiver<()>,
    debounce: Duration,
) {
    // The initial load happened in `HostAccessControl::new`.
    let mut reinit = false;

    loop {
        if reinit {
            let Some(acl) = acl.upgrade() else { return };
            if !matches!(acl.reload(kind), ListSource::File(_)) {
                tracing::info!(list = %kind, path = ?path, "List file gone, watcher closed");
                return;
            }
        } else if !path.exists() {
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = match start_watcher(&path, tx) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(list = %kind, path = ?path, error = %e, "Failed to watch list file");
                return;
            }
        };
        tracing::info!(list = %kind, path = ?path, "List watcher started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(list = %kind, "List watcher shutting down");
                    return;
                }
                event = rx.recv() => match event {
                    None => return,
                    Some(FileEvent::Gone) => break,
                    Some(FileEvent::Changed) => {
                        tokio::select! {
                            _ = shutdown.recv() => {
                                tracing::debug!(list = %kind, "List watcher shutting down");
                                return;
                            }
                            _ = tokio::time::sleep(debounce) => {}
                        }

                        let mut gone = false;
                        while let Ok(pending) = rx.try_recv() {
                            gone |= pending == FileEvent::Gone;
                        }
                        if gone {
                            break;
                        }

                        let Some(acl) = acl.upgrade() else { return };
                        acl.reload(kind);
                    }
                },
            }
        }

        drop(watcher);
        reinit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxySettings;
    use crate::lifecycle::Shutdown;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use std::sync::Arc;

    #[test]
    fn test_classify() {
        let event = |kind| Event::new(kind);
        assert_eq!(
            classify(&event(EventKind::Modify(ModifyKind::Data(DataChange::Content)))),
            Some(FileEvent::Changed)
        );
        assert_eq!(
            classify(&event(EventKind::Create(CreateKind::File))),
            Some(FileEvent::Changed)
        );
        assert_eq!(
            classify(&event(EventKind::Modify(ModifyKind::Name(RenameMode::From)))),
            Some(FileEvent::Gone)
        );
        assert_eq!(
            classify(&event(EventKind::Remove(RemoveKind::File))),
            Some(FileEvent::Gone)
        );
        assert_eq!(classify(&event(EventKind::Any)), None);
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..60 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_change_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.txt");
        std::fs::write(&path, "first.example.com\n").unwrap();

        let mut settings = ProxySettings::default();
        settings.whitelist_path = Some(path.clone());
        let acl = Arc::new(HostAccessControl::new(&settings));
        let shutdown = Shutdown::new();
        acl.watch(&shutdown);
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&path, "second.example.com\n").unwrap();
        assert!(wait_for(|| acl.is_whitelisted("second.example.com")).await);
        assert!(!acl.is_whitelisted("first.example.com"));

        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_delete_falls_back_to_static_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.txt");
        std::fs::write(&path, "watched.example.org\n").unwrap();

        let mut settings = ProxySettings::default();
        settings.allow_proxy_for = vec!["static.example.com".into()];
        settings.whitelist_path = Some(path.clone());
        let acl = Arc::new(HostAccessControl::new(&settings));
        let shutdown = Shutdown::new();
        acl.watch(&shutdown);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(*acl.whitelist(), vec!["watched.example.org".to_string()]);

        std::fs::remove_file(&path).unwrap();
        assert!(wait_for(|| *acl.whitelist() == vec!["static.example.com".to_string()]).await);

        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.txt");
        std::fs::write(&path, "first.example.com\n").unwrap();

        let mut settings = ProxySettings::default();
        settings.whitelist_path = Some(path.clone());
        let acl = Arc::new(HostAccessControl::new(&settings));
        let shutdown = Shutdown::new();
        let handle = spawn(
            Arc::downgrade(&acl),
            ListKind::Whitelist,
            path.clone(),
            shutdown.subscribe(),
            Duration::from_secs(60),
        );
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&path, "second.example.com\n").unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown.trigger();

        assert!(tokio::time::timeout(Duration::from_secs(5), handle).await.is_ok());
        assert!(acl.is_whitelisted("first.example.com"));
    }
}
