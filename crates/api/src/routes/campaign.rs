//! Route definitions for the campaign composer.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::campaign;
use crate::state::AppState;

/// Multipart framing allowance on top of the contact file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Campaign routes mounted at `/campaign`.
///
/// ```text
/// GET    /                    -> get_campaign
/// POST   /import              -> import_contacts (multipart)
/// PUT    /draft               -> set_draft
/// POST   /estimate            -> estimate_message
/// POST   /selection/all       -> include_all
/// POST   /selection/none      -> include_none
/// POST   /selection/remove    -> remove_included
/// POST   /rows/{id}/toggle    -> toggle_row
/// GET    /rows/{id}/preview   -> preview_row
/// DELETE /rows/{id}           -> remove_row
/// POST   /undo                -> undo
/// POST   /notice/dismiss      -> dismiss_notice
/// POST   /dispatch            -> dispatch
/// POST   /verify-pin          -> verify_pin
/// POST   /new                 -> new_broadcast
/// ```
///
/// The import route accepts bodies a little over `max_import_bytes` so that
/// an oversized file reaches the handler and gets a readable error.
pub fn campaign_router(max_import_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(campaign::get_campaign))
        .route(
            "/import",
            post(campaign::import_contacts).layer(DefaultBodyLimit::max(
                max_import_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
            )),
        )
        .route("/draft", put(campaign::set_draft))
        .route("/estimate", post(campaign::estimate_message))
        .route("/selection/all", post(campaign::include_all))
        .route("/selection/none", post(campaign::include_none))
        .route("/selection/remove", post(campaign::remove_included))
        .route("/rows/{id}/toggle", post(campaign::toggle_row))
        .route("/rows/{id}/preview", get(campaign::preview_row))
        .route("/rows/{id}", delete(campaign::remove_row))
        .route("/undo", post(campaign::undo))
        .route("/notice/dismiss", post(campaign::dismiss_notice))
        .route("/dispatch", post(campaign::dispatch))
        .route("/verify-pin", post(campaign::verify_pin))
        .route("/new", post(campaign::new_broadcast))
}
