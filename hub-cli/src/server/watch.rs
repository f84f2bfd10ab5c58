use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hub_registry::{Catalog, RecordKind};
use notify::{EventKind, RecursiveMode, Watcher};
use tracing::{info, warn};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Check whether a notify event touches a record file (or a directory that
/// may contain some) under one of the watched roots.
fn affected_kinds(roots: &[(RecordKind, PathBuf)], event: &notify::Event) -> Vec<RecordKind> {
    roots
        .iter()
        .filter(|(_, root)| {
            event
                .paths
                .iter()
                .any(|p| p.starts_with(root) && may_hold_records(p))
        })
        .map(|(kind, _)| *kind)
        .collect()
}

fn may_hold_records(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => ext == "json",
        None => true,
    }
}

/// Rescans a kind shortly after files under its root change. Runs alongside
/// the TTL policy; it only makes edits visible sooner.
pub async fn watch_roots(catalog: Arc<Catalog>) {
    let roots: Vec<(RecordKind, PathBuf)> = RecordKind::ALL
        .iter()
        .filter_map(|&kind| match catalog.root(kind).canonicalize() {
            Ok(root) => Some((kind, root)),
            Err(e) => {
                warn!(
                    kind = %kind,
                    root = %catalog.root(kind).display(),
                    error = %e,
                    "not watching {} directory",
                    kind
                );
                None
            }
        })
        .collect();
    if roots.is_empty() {
        return;
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel::<RecordKind>(16);
    let routing = roots.clone();

    let mut watcher = match notify::recommended_watcher(move |res: Result<notify::Event, _>| {
        if let Ok(event) = res {
            if matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
            ) {
                for kind in affected_kinds(&routing, &event) {
                    let _ = tx.try_send(kind);
                }
            }
        }
    }) {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!(error = %e, "failed to create file watcher, relying on cache TTL");
            return;
        }
    };

    for (kind, root) in &roots {
        match watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => info!(kind = %kind, root = %root.display(), "watching for changes"),
            Err(e) => warn!(kind = %kind, root = %root.display(), error = %e, "failed to watch"),
        }
    }

    // Keep watcher alive for the lifetime of this task
    let _watcher = watcher;

    loop {
        // Wait for a change notification
        let Some(first) = rx.recv().await else {
            break;
        };

        // Debounce: wait a bit and drain any extra events
        tokio::time::sleep(DEBOUNCE).await;
        let mut kinds = vec![first];
        while let Ok(kind) = rx.try_recv() {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        for kind in kinds {
            let catalog = Arc::clone(&catalog);
            match tokio::task::spawn_blocking(move || catalog.reload(kind)).await {
                Ok(Ok(report)) => info!(
                    kind = %kind,
                    files = report.files_loaded,
                    skipped = report.skipped.len(),
                    "{} reloaded after change",
                    kind.plural()
                ),
                Ok(Err(e)) => warn!(kind = %kind, error = %e, "reload after change failed"),
                Err(e) => warn!(kind = %kind, error = %e, "reload task failed"),
            }
        }
    }
}
