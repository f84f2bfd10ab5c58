use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use hub_registry::{Catalog, CatalogError, RecordKind};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::state::AppState;

const LANDING_PAGE: &str = include_str!("landing.html");

// ── Response envelope ────────────────────────────────────────

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

fn respond_success<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(SuccessResponse {
            success: true,
            data,
        }),
    )
        .into_response()
}

fn respond_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: message.into(),
        }),
    )
        .into_response()
}

pub fn error_status(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
        CatalogError::EmptyQuery => StatusCode::BAD_REQUEST,
        CatalogError::Scan(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Runs a catalog query off the async runtime, since a query may rescan
/// the disk, and wraps the outcome in the response envelope.
async fn run_query<T, F>(state: &AppState, query: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&Catalog) -> Result<T, CatalogError> + Send + 'static,
{
    let catalog = Arc::clone(&state.catalog);
    match tokio::task::spawn_blocking(move || query(&catalog)).await {
        Ok(Ok(data)) => respond_success(data),
        Ok(Err(e)) => respond_error(error_status(&e), e.to_string()),
        Err(e) => {
            error!(error = %e, "catalog query task failed");
            respond_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

impl SearchParams {
    fn required(self) -> Result<String, Response> {
        match self.q {
            Some(q) if !q.is_empty() => Ok(q),
            _ => Err(respond_error(
                StatusCode::BAD_REQUEST,
                "query parameter 'q' is required",
            )),
        }
    }
}

// ── GET / , /health , /readyz ────────────────────────────────

pub async fn handle_landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

pub async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once templates have been loaded at least once. Reports per-kind
/// counts without triggering a reload.
pub async fn handle_readyz(State(state): State<Arc<AppState>>) -> Response {
    let kinds = state.catalog.status();
    let ready = kinds
        .iter()
        .any(|s| s.kind == RecordKind::Template && s.loaded_at.is_some());
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "ready": ready,
            "started_at": state.started_at,
            "cache_ttl_secs": state.catalog.cache_ttl().as_secs(),
            "kinds": kinds,
        })),
    )
        .into_response()
}

// ── /api/v1/templates ────────────────────────────────────────

pub async fn handle_list_templates(State(state): State<Arc<AppState>>) -> Response {
    run_query(&state, |catalog| Ok(catalog.list_templates())).await
}

pub async fn handle_template_categories(State(state): State<Arc<AppState>>) -> Response {
    run_query(&state, |catalog| Ok(catalog.template_categories())).await
}

pub async fn handle_search_templates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let q = match params.required() {
        Ok(q) => q,
        Err(response) => return response,
    };
    run_query(&state, move |catalog| catalog.search_templates(&q)).await
}

pub async fn handle_get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    run_query(&state, move |catalog| catalog.get_template(&id)).await
}

// ── /api/v1/apps ─────────────────────────────────────────────

pub async fn handle_list_apps(State(state): State<Arc<AppState>>) -> Response {
    run_query(&state, |catalog| Ok(catalog.list_apps())).await
}

pub async fn handle_app_categories(State(state): State<Arc<AppState>>) -> Response {
    run_query(&state, |catalog| Ok(catalog.app_categories())).await
}

pub async fn handle_search_apps(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let q = match params.required() {
        Ok(q) => q,
        Err(response) => return response,
    };
    run_query(&state, move |catalog| catalog.search_apps(&q)).await
}

pub async fn handle_get_app(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    run_query(&state, move |catalog| catalog.get_app(&id)).await
}

#[cfg(test)]
mod tests {
    use std::fs;

    use hub_registry::CatalogConfig;

    use super::*;

    fn state_with(templates: &[(&str, &str)]) -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("templates");
        fs::create_dir_all(&root).unwrap();
        for (file, body) in templates {
            fs::write(root.join(file), body).unwrap();
        }
        let catalog = Catalog::new(CatalogConfig {
            templates_dir: root,
            apps_dir: dir.path().join("apps"),
            ..CatalogConfig::default()
        });
        catalog.initialize().unwrap();
        (dir, Arc::new(AppState::new(Arc::new(catalog))))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_template_wraps_record_in_envelope() {
        let (_dir, state) = state_with(&[(
            "gitea.json",
            r#"{"id":"gitea","name":"Gitea","category":"dev","compose":"services: {}"}"#,
        )]);
        let response = handle_get_template(State(state), Path("gitea".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], "gitea");
        assert_eq!(body["data"]["compose"], "services: {}");
    }

    #[tokio::test]
    async fn test_unknown_id_is_404() {
        let (_dir, state) = state_with(&[]);
        let response = handle_get_app(State(state), Path("nope".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "app not found: nope");
    }

    #[tokio::test]
    async fn test_search_without_query_is_400() {
        let (_dir, state) = state_with(&[]);
        for q in [None, Some(String::new())] {
            let response =
                handle_search_templates(State(state.clone()), Query(SearchParams { q })).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert_eq!(body["error"], "query parameter 'q' is required");
        }
    }

    #[tokio::test]
    async fn test_list_and_search_return_metadata_only() {
        let (_dir, state) = state_with(&[
            (
                "a.json",
                r#"{"id":"a","name":"Media Server","category":"media","compose":"big"}"#,
            ),
            ("b.json", r#"{"id":"b","name":"Backup","category":"storage"}"#),
        ]);
        let response = handle_list_templates(State(state.clone())).await;
        let body = body_json(response).await;
        let items = body["data"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.get("compose").is_none()));

        let response = handle_search_templates(
            State(state),
            Query(SearchParams {
                q: Some("MEDIA".to_string()),
            }),
        )
        .await;
        let body = body_json(response).await;
        let items = body["data"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "a");
    }

    #[tokio::test]
    async fn test_categories_and_empty_apps() {
        let (_dir, state) = state_with(&[(
            "a.json",
            r#"{"id":"a","name":"A","category":"media"}"#,
        )]);
        let body = body_json(handle_template_categories(State(state.clone())).await).await;
        assert_eq!(body["data"], serde_json::json!(["media"]));

        let body = body_json(handle_list_apps(State(state.clone())).await).await;
        assert_eq!(body["data"], serde_json::json!([]));
        let body = body_json(handle_app_categories(State(state)).await).await;
        assert_eq!(body["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_readyz_reports_kinds() {
        let (_dir, state) = state_with(&[("a.json", r#"{"id":"a","name":"A"}"#)]);
        let response = handle_readyz(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ready"], true);
        assert_eq!(body["kinds"][0]["kind"], "template");
        assert_eq!(body["kinds"][0]["records"], 1);
        assert_eq!(body["kinds"][1]["records"], 0);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(error_status(&CatalogError::EmptyQuery), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_status(&CatalogError::NotFound {
                kind: RecordKind::Template,
                id: "x".into()
            }),
            StatusCode::NOT_FOUND
        );
    }
}
