//! Registry of deployable templates and NAS apps.
//!
//! Records are loaded from two directory trees of JSON files (one record per
//! file) into per-kind in-memory snapshots. Queries go through [`Catalog`],
//! which rescans a kind's directory whenever its snapshot is older than the
//! configured cache TTL.
//!
//! ```no_run
//! use hub_registry::{Catalog, CatalogConfig};
//!
//! let catalog = Catalog::new(CatalogConfig::default());
//! catalog.initialize().expect("templates directory must exist");
//! for tpl in catalog.search_templates("media").unwrap() {
//!     println!("{} ({})", tpl.name, tpl.category);
//! }
//! ```

pub mod catalog;
pub mod clock;
pub mod error;
pub mod record;
pub mod scan;
pub mod store;

pub use catalog::{Catalog, CatalogConfig, KindStatus, DEFAULT_CACHE_TTL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CatalogError, ScanError};
pub use record::{App, Record, RecordKind, RecordMetadata, Template, TemplateRequirements};
pub use scan::{RootPolicy, ScanReport, SkipReason, SkippedFile};
pub use store::{RecordStore, Snapshot};
