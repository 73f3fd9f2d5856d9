use axum::Json;

use crate::dtos::auth::SdkAppResponse;
use crate::middleware::CurrentApp;

/// App bound to the caller's API key.
///
/// GET /sdk/app
pub async fn current_app(app: CurrentApp) -> Json<SdkAppResponse> {
    Json(SdkAppResponse { app_id: app.app_id })
}
