use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{CatalogError, ScanError};
use crate::record::{App, Record, RecordKind, RecordMetadata, Template};
use crate::scan::{scan_root, RootPolicy, ScanReport};
use crate::store::{RecordStore, Snapshot};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Where the catalog reads from and how long a loaded snapshot stays fresh.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub templates_dir: PathBuf,
    pub apps_dir: PathBuf,
    pub cache_ttl: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("./templates"),
            apps_dir: PathBuf::from("./apps"),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Load state of one record kind, for readiness reporting.
#[derive(Debug, Clone, Serialize)]
pub struct KindStatus {
    pub kind: RecordKind,
    pub root: PathBuf,
    pub records: usize,
    pub categories: usize,
    pub loaded_at: Option<DateTime<Utc>>,
}

type ScanObserver = Box<dyn Fn(RecordKind, Result<&ScanReport, &ScanError>) + Send + Sync>;

/// One record kind: where it lives on disk and the store holding it.
struct Section<R> {
    root: PathBuf,
    policy: RootPolicy,
    store: RecordStore<R>,
    // Serializes rescans of this kind.
    scan_gate: Mutex<()>,
}

impl<R: Record> Section<R> {
    fn new(root: PathBuf, policy: RootPolicy) -> Self {
        Self {
            root,
            policy,
            store: RecordStore::new(),
            scan_gate: Mutex::new(()),
        }
    }

    fn status(&self) -> KindStatus {
        let snapshot = self.store.current_snapshot();
        KindStatus {
            kind: R::KIND,
            root: self.root.clone(),
            records: snapshot.len(),
            categories: snapshot.category_count(),
            loaded_at: snapshot.loaded_at(),
        }
    }
}

/// The template and app registry.
///
/// Each query first checks whether the snapshot for its kind is older than
/// the cache TTL and, if so, rescans that kind's directory before answering.
/// There is no background refresh: a catalog that sees no traffic serves one
/// stale read after expiry, then reloads.
pub struct Catalog {
    templates: Section<Template>,
    apps: Section<App>,
    cache_ttl: Duration,
    clock: Arc<dyn Clock>,
    on_scan: Option<ScanObserver>,
}

impl Catalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            templates: Section::new(config.templates_dir, RootPolicy::Required),
            apps: Section::new(config.apps_dir, RootPolicy::Optional),
            cache_ttl: config.cache_ttl,
            clock: Arc::new(SystemClock),
            on_scan: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a callback that fires after every scan attempt, successful
    /// or not. It runs on the thread that performed the scan.
    pub fn on_scan(
        mut self,
        cb: impl Fn(RecordKind, Result<&ScanReport, &ScanError>) + Send + Sync + 'static,
    ) -> Self {
        self.on_scan = Some(Box::new(cb));
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn root(&self, kind: RecordKind) -> &Path {
        match kind {
            RecordKind::Template => &self.templates.root,
            RecordKind::App => &self.apps.root,
        }
    }

    /// Loads both kinds. Templates are mandatory and any failure to reach
    /// their directory is returned. Apps are optional: a missing directory
    /// yields an empty set and other failures are only logged.
    pub fn initialize(&self) -> Result<(), CatalogError> {
        info!(
            templates = %self.templates.root.display(),
            apps = %self.apps.root.display(),
            "loading templates and apps"
        );

        self.rescan(&self.templates)?;
        if let Err(e) = self.rescan(&self.apps) {
            warn!(error = %e, "apps directory not readable, serving no apps");
        }

        info!(
            templates = self.templates.store.current_snapshot().len(),
            apps = self.apps.store.current_snapshot().len(),
            "catalog loaded"
        );
        Ok(())
    }

    /// Rescans one kind now, regardless of snapshot age.
    pub fn reload(&self, kind: RecordKind) -> Result<ScanReport, CatalogError> {
        let report = match kind {
            RecordKind::Template => self.rescan(&self.templates)?,
            RecordKind::App => self.rescan(&self.apps)?,
        };
        Ok(report)
    }

    /// Current load state of both kinds. Does not trigger a reload.
    pub fn status(&self) -> Vec<KindStatus> {
        vec![self.templates.status(), self.apps.status()]
    }

    pub fn get_template(&self, id: &str) -> Result<Template, CatalogError> {
        self.get(&self.templates, id)
    }

    pub fn list_templates(&self) -> Vec<RecordMetadata> {
        self.list(&self.templates)
    }

    pub fn template_categories(&self) -> Vec<String> {
        self.categories(&self.templates)
    }

    pub fn search_templates(&self, query: &str) -> Result<Vec<RecordMetadata>, CatalogError> {
        self.search(&self.templates, query)
    }

    pub fn get_app(&self, id: &str) -> Result<App, CatalogError> {
        self.get(&self.apps, id)
    }

    pub fn list_apps(&self) -> Vec<RecordMetadata> {
        self.list(&self.apps)
    }

    pub fn app_categories(&self) -> Vec<String> {
        self.categories(&self.apps)
    }

    pub fn search_apps(&self, query: &str) -> Result<Vec<RecordMetadata>, CatalogError> {
        self.search(&self.apps, query)
    }

    fn get<R: Record>(&self, section: &Section<R>, id: &str) -> Result<R, CatalogError> {
        self.fresh(section)
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                kind: R::KIND,
                id: id.to_string(),
            })
    }

    fn list<R: Record>(&self, section: &Section<R>) -> Vec<RecordMetadata> {
        self.fresh(section).records().map(Record::metadata).collect()
    }

    fn categories<R: Record>(&self, section: &Section<R>) -> Vec<String> {
        self.fresh(section)
            .categories()
            .map(str::to_string)
            .collect()
    }

    fn search<R: Record>(
        &self,
        section: &Section<R>,
        query: &str,
    ) -> Result<Vec<RecordMetadata>, CatalogError> {
        if query.is_empty() {
            return Err(CatalogError::EmptyQuery);
        }
        let needle = query.to_lowercase();
        Ok(self
            .fresh(section)
            .records()
            .filter(|record| record.matches(&needle))
            .map(Record::metadata)
            .collect())
    }

    /// Returns the snapshot to answer a query from, rescanning first if the
    /// current one has outlived the TTL.
    ///
    /// Concurrent callers that all find the snapshot stale queue on the scan
    /// gate; the first one rescans and the rest see a fresh snapshot when
    /// they re-check. A failed rescan leaves the old snapshot in place.
    fn fresh<R: Record>(&self, section: &Section<R>) -> Arc<Snapshot<R>> {
        if !self.is_stale(section) {
            return section.store.current_snapshot();
        }

        let _gate = section
            .scan_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_stale(section) {
            debug!(kind = %R::KIND, ttl_secs = self.cache_ttl.as_secs(), "cache expired, rescanning");
            if let Err(e) = self.scan_and_install(section) {
                warn!(kind = %R::KIND, error = %e, "reload failed, serving previous snapshot");
            }
        }
        section.store.current_snapshot()
    }

    fn is_stale<R: Record>(&self, section: &Section<R>) -> bool {
        let Some(loaded_at) = section.store.last_load_time() else {
            return true;
        };
        match (self.clock.now() - loaded_at).to_std() {
            Ok(elapsed) => elapsed > self.cache_ttl,
            // Clock moved backwards past the load time.
            Err(_) => false,
        }
    }

    fn rescan<R: Record>(&self, section: &Section<R>) -> Result<ScanReport, ScanError> {
        let _gate = section
            .scan_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.scan_and_install(section)
    }

    // Caller must hold the section's scan gate.
    fn scan_and_install<R: Record>(&self, section: &Section<R>) -> Result<ScanReport, ScanError> {
        let outcome = match scan_root::<R>(&section.root, section.policy) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.notify(R::KIND, Err(&e));
                return Err(e);
            }
        };

        let snapshot = Snapshot::build(outcome.records, self.clock.now());
        let report = outcome.report;
        info!(
            kind = %R::KIND,
            records = snapshot.len(),
            categories = snapshot.category_count(),
            skipped = report.skipped.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "loaded {}",
            R::KIND.plural()
        );
        section.store.replace_snapshot(snapshot);
        self.notify(R::KIND, Ok(&report));
        Ok(report)
    }

    fn notify(&self, kind: RecordKind, result: Result<&ScanReport, &ScanError>) {
        if let Some(cb) = &self.on_scan {
            cb(kind, result);
        }
    }
}
