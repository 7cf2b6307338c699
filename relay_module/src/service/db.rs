use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::adapters::is_valid_table_name;

use super::error::RelayError;
use super::parse_json_body;
use super::state::RelayState;

#[derive(Debug, Deserialize)]
pub(super) struct InsertRequest {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Insert one record (or a batch) into an arbitrary table.
pub(super) async fn insert_record(
    State(state): State<Arc<RelayState>>,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let request: InsertRequest = parse_json_body(&body)?;
    let table = request
        .table
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RelayError::Validation("table is required".to_string()))?;
    let data = request
        .data
        .filter(|value| !value.is_null())
        .ok_or_else(|| RelayError::Validation("data is required".to_string()))?;
    if !is_valid_table_name(&table) {
        return Err(RelayError::Validation(format!("invalid table name: {}", table)));
    }

    let supabase = state.supabase()?;
    let rows = supabase
        .insert(&table, &data)
        .await
        .map_err(|err| RelayError::upstream("failed to insert record", err))?;

    info!("inserted into {}", table);
    Ok(Json(json!({
        "status": "success",
        "data": rows,
    })))
}
