use std::sync::Arc;

use chrono::{DateTime, Utc};
use hub_registry::Catalog;

/// Shared application state for the HTTP server.
pub struct AppState {
    /// Template and app registry. Queries may rescan the disk, so handlers
    /// call into it from blocking tasks.
    pub catalog: Arc<Catalog>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            started_at: Utc::now(),
        }
    }
}
