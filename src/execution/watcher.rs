//! File-system watcher feeding the watch scheduler

use crate::core::error::WatchError;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{trace, warn};

/// Whether an event describes a content change worth rebuilding for
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Watch `root` recursively, forwarding changed paths to `tx`
///
/// The returned watcher must be kept alive for the session.
pub fn watch_project(
    root: &Path,
    tx: UnboundedSender<PathBuf>,
) -> Result<RecommendedWatcher, WatchError> {
    let mut watcher = recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_change(&event.kind) => {
            for path in event.paths {
                trace!("fs change: {}", path.display());
                let _ = tx.send(path);
            }
        }
        Ok(_) => {}
        Err(e) => warn!("Watch error: {}", e),
    })
    .map_err(WatchError::WatcherInit)?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|source| WatchError::WatchPath {
            path: root.to_path_buf(),
            source,
        })?;

    Ok(watcher)
}
