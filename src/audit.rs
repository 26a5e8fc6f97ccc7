use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde_json::Value;
use uuid::Uuid;

use crate::{entity::audit_logs::ActiveModel as AuditActive, error::AppResult};

pub async fn log_audit<C: ConnectionTrait>(
    conn: &C,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    AuditActive {
        id: Set(Uuid::new_v4()),
        action: Set(action.to_string()),
        resource: Set(resource.map(str::to_string)),
        metadata: Set(metadata),
        created_at: Set(Utc::now().into()),
    }
    .insert(conn)
    .await?;

    Ok(())
}

/// Writes an audit row, downgrading a failure to a warning.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    action: &str,
    resource: Option<&str>,
    metadata: Value,
) {
    if let Err(err) = log_audit(conn, action, resource, Some(metadata)).await {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}
