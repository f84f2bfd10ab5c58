use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::record::{Record, RecordKind};

/// How a scan treats a root directory that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootPolicy {
    /// A missing root is a scan failure.
    Required,
    /// A missing root yields an empty result.
    Optional,
}

/// Why a single file was left out of a scan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("failed to read: {0}")]
    Read(String),
    #[error("failed to parse: {0}")]
    Parse(String),
    #[error("missing id or name")]
    MissingIdOrName,
    #[error("failed to walk: {0}")]
    Walk(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// What a scan saw: how many records it kept and which files it dropped.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub kind: RecordKind,
    pub root: PathBuf,
    /// Valid record files found, before identifier deduplication.
    pub files_loaded: usize,
    /// Files whose identifier was already claimed by an earlier file.
    pub duplicates: usize,
    pub skipped: Vec<SkippedFile>,
    /// Set when an optional root did not exist.
    pub root_missing: bool,
    pub elapsed: Duration,
}

impl ScanReport {
    fn new(kind: RecordKind, root: &Path) -> Self {
        Self {
            kind,
            root: root.to_path_buf(),
            files_loaded: 0,
            duplicates: 0,
            skipped: Vec::new(),
            root_missing: false,
            elapsed: Duration::ZERO,
        }
    }

    fn skip(&mut self, path: &Path, reason: SkipReason) {
        warn!(
            kind = %self.kind,
            path = %path.display(),
            reason = %reason,
            "skipping {} file",
            self.kind
        );
        self.skipped.push(SkippedFile {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Records discovered by a scan, in walk order.
#[derive(Debug)]
pub struct ScanOutcome<R> {
    pub records: Vec<R>,
    pub report: ScanReport,
}

/// Walks `root` recursively and parses every `*.json` file as an `R`.
///
/// Individual files that cannot be read or parsed, or that lack an id or
/// name, are logged and skipped. Only a root that cannot be accessed or
/// listed fails the scan. Entries are visited in file-name order so identifier
/// collisions resolve the same way on every filesystem.
pub fn scan_root<R: Record>(root: &Path, policy: RootPolicy) -> Result<ScanOutcome<R>, ScanError> {
    let started = Instant::now();
    let mut report = ScanReport::new(R::KIND, root);

    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(ScanError::NotADirectory {
                kind: R::KIND,
                path: root.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound && policy == RootPolicy::Optional => {
            debug!(kind = %R::KIND, root = %root.display(), "root does not exist, nothing to load");
            report.root_missing = true;
            report.elapsed = started.elapsed();
            return Ok(ScanOutcome {
                records: Vec::new(),
                report,
            });
        }
        Err(source) => {
            return Err(ScanError::RootUnreadable {
                kind: R::KIND,
                path: root.to_path_buf(),
                source,
            })
        }
    }

    // The walker reports an unlistable root as an ordinary entry error.
    if let Err(source) = fs::read_dir(root) {
        return Err(ScanError::RootUnreadable {
            kind: R::KIND,
            path: root.to_path_buf(),
            source,
        });
    }

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut records = Vec::new();
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = walk_error_path(&e).unwrap_or_else(|| root.to_path_buf());
                if path == root {
                    let kind = e.io_error().map_or(io::ErrorKind::Other, io::Error::kind);
                    return Err(ScanError::RootUnreadable {
                        kind: R::KIND,
                        path: root.to_path_buf(),
                        source: io::Error::new(kind, e.to_string()),
                    });
                }
                report.skip(&path, SkipReason::Walk(e.to_string()));
                continue;
            }
        };

        if entry.file_type().map_or(true, |ft| ft.is_dir()) || !is_json_file(entry.path()) {
            continue;
        }

        let path = entry.path();
        let record: R = match load_record(path) {
            Ok(record) => record,
            Err(reason) => {
                report.skip(path, reason);
                continue;
            }
        };

        if let Some(previous) = claimed.insert(record.id().to_string(), path.to_path_buf()) {
            warn!(
                kind = %R::KIND,
                id = record.id(),
                kept = %path.display(),
                replaced = %previous.display(),
                "duplicate {} id, later file wins",
                R::KIND
            );
            report.duplicates += 1;
        }
        report.files_loaded += 1;
        records.push(record);
    }

    report.elapsed = started.elapsed();
    Ok(ScanOutcome { records, report })
}

fn is_json_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".json"))
}

fn load_record<R: Record>(path: &Path) -> Result<R, SkipReason> {
    let bytes = fs::read(path).map_err(|e| SkipReason::Read(e.to_string()))?;
    let record: R = serde_json::from_slice(&bytes).map_err(|e| SkipReason::Parse(e.to_string()))?;
    if !record.is_complete() {
        return Err(SkipReason::MissingIdOrName);
    }
    Ok(record)
}

fn walk_error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{App, Template};

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn ids<R: Record>(outcome: &ScanOutcome<R>) -> Vec<String> {
        outcome.records.iter().map(|r| r.id().to_string()).collect()
    }

    #[test]
    fn test_scan_walks_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "media/jellyfin.json", r#"{"id":"jellyfin","name":"Jellyfin"}"#);
        write(dir.path(), "dev/git/gitea.json", r#"{"id":"gitea","name":"Gitea"}"#);
        write(dir.path(), ".hidden/secret.json", r#"{"id":"hidden","name":"Hidden"}"#);

        let outcome = scan_root::<Template>(dir.path(), RootPolicy::Required).unwrap();
        let mut found = ids(&outcome);
        found.sort();
        assert_eq!(found, vec!["gitea", "hidden", "jellyfin"]);
        assert_eq!(outcome.report.files_loaded, 3);
        assert!(outcome.report.skipped.is_empty());
    }

    #[test]
    fn test_scan_ignores_non_json_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "# templates");
        write(dir.path(), "jellyfin.json.bak", r#"{"id":"old","name":"Old"}"#);
        write(dir.path(), "jellyfin.json", r#"{"id":"jellyfin","name":"Jellyfin"}"#);

        let outcome = scan_root::<Template>(dir.path(), RootPolicy::Required).unwrap();
        assert_eq!(ids(&outcome), vec!["jellyfin"]);
        assert!(outcome.report.skipped.is_empty());
    }

    #[test]
    fn test_bad_files_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a_broken.json", "{ not json");
        write(dir.path(), "b_noname.json", r#"{"id":"noname"}"#);
        write(dir.path(), "c_noid.json", r#"{"name":"No Id"}"#);
        write(dir.path(), "d_good.json", r#"{"id":"good","name":"Good"}"#);

        let outcome = scan_root::<App>(dir.path(), RootPolicy::Required).unwrap();
        assert_eq!(ids(&outcome), vec!["good"]);
        assert_eq!(outcome.report.skipped.len(), 3);
        assert!(matches!(outcome.report.skipped[0].reason, SkipReason::Parse(_)));
        assert_eq!(outcome.report.skipped[1].reason, SkipReason::MissingIdOrName);
        assert_eq!(outcome.report.skipped[2].reason, SkipReason::MissingIdOrName);
        assert!(outcome.report.skipped[0].path.ends_with("a_broken.json"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("dangling.json"))
            .unwrap();
        write(dir.path(), "ok.json", r#"{"id":"ok","name":"Ok"}"#);

        let outcome = scan_root::<App>(dir.path(), RootPolicy::Required).unwrap();
        assert_eq!(ids(&outcome), vec!["ok"]);
        assert_eq!(outcome.report.skipped.len(), 1);
        assert!(matches!(outcome.report.skipped[0].reason, SkipReason::Read(_)));
    }

    #[test]
    fn test_duplicates_resolve_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.json", r#"{"id":"dup","name":"Second","version":"2"}"#);
        write(dir.path(), "a.json", r#"{"id":"dup","name":"First","version":"1"}"#);

        let outcome = scan_root::<Template>(dir.path(), RootPolicy::Required).unwrap();
        assert_eq!(outcome.report.duplicates, 1);
        assert_eq!(outcome.records.last().map(|t| t.name.as_str()), Some("Second"));
    }

    #[test]
    fn test_missing_required_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = scan_root::<Template>(&missing, RootPolicy::Required).unwrap_err();
        assert!(matches!(err, ScanError::RootUnreadable { kind: RecordKind::Template, .. }));
    }

    #[test]
    fn test_missing_optional_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let outcome = scan_root::<App>(&missing, RootPolicy::Optional).unwrap();
        assert!(outcome.records.is_empty());
        assert!(outcome.report.root_missing);
    }

    #[cfg(unix)]
    #[test]
    fn test_unlistable_root_fails() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("templates");
        write(&root, "a.json", r#"{"id":"a","name":"A"}"#);
        fs::set_permissions(&root, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&root).is_ok() {
            // Running as root, permission bits are not enforced.
            fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = scan_root::<Template>(&root, RootPolicy::Required);
        let optional = scan_root::<App>(&root, RootPolicy::Optional);
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(
            result,
            Err(ScanError::RootUnreadable { kind: RecordKind::Template, .. })
        ));
        assert!(matches!(optional, Err(ScanError::RootUnreadable { .. })));
    }

    #[test]
    fn test_root_that_is_a_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "apps.json", "{}");
        let err = scan_root::<App>(&dir.path().join("apps.json"), RootPolicy::Optional).unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }
}
