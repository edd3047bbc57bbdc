use anyhow::anyhow;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::db;

const USER_ID_SETTING: &str = "identity.userId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentitySource {
    Provided,
    Persisted,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub source: IdentitySource,
}

fn check_user_id(id: &str) -> anyhow::Result<()> {
    if id.is_empty() {
        return Err(anyhow!("userId must not be empty"));
    }
    if id.contains('/') {
        return Err(anyhow!("userId must not contain '/'"));
    }
    Ok(())
}

/// Resolves the opaque id that scopes every collection of the session.
///
/// A caller-provided id wins for the session without being persisted. Otherwise the
/// workspace keeps one generated id so data stays reachable across restarts.
pub fn resolve_identity(conn: &Connection, provided: Option<&str>) -> anyhow::Result<Identity> {
    if let Some(p) = provided {
        let id = p.trim();
        check_user_id(id)?;
        return Ok(Identity {
            user_id: id.to_string(),
            source: IdentitySource::Provided,
        });
    }

    if let Some(v) = db::settings_get_json(conn, USER_ID_SETTING)? {
        if let Some(id) = v.get("userId").and_then(|x| x.as_str()) {
            if check_user_id(id).is_ok() {
                return Ok(Identity {
                    user_id: id.to_string(),
                    source: IdentitySource::Persisted,
                });
            }
            tracing::warn!(user_id = id, "ignoring unusable persisted user id");
        }
    }

    let user_id = Uuid::new_v4().to_string();
    db::settings_set_json(conn, USER_ID_SETTING, &json!({ "userId": user_id }))?;
    Ok(Identity {
        user_id,
        source: IdentitySource::Generated,
    })
}
