pub mod campaign;
pub mod health;

use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /campaign                      session view
/// /campaign/import               contact file upload
/// /campaign/draft                message draft
/// /campaign/estimate             stateless segment estimate
/// /campaign/selection/...        include all / none, remove included
/// /campaign/rows/{id}/...        toggle, preview, remove
/// /campaign/undo                 undo last removal
/// /campaign/notice/dismiss       close removal notice
/// /campaign/dispatch             send to included rows
/// /campaign/verify-pin           check a dispatch credential
/// /campaign/new                  reset the session
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new().nest("/campaign", campaign::campaign_router(config.max_import_bytes))
}
