//! Model listing.

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::gateway::generator::list_models;

pub async fn handle_list_models() -> impl IntoResponse {
    let data: Vec<_> = list_models()
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": 1_704_067_200,
                "owned_by": "dreamina"
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data
    }))
}
