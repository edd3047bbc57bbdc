use serde_json::json;
use std::path::{Path, PathBuf};

use crate::config;
use crate::db;
use crate::identity;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{failure, session};
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use crate::store::{CollectionName, DocumentStore};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "userId": state.session.as_ref().map(|s| s.user_id().to_string()),
        }),
    )
}

/// Opens (or reopens) a workspace: config, database, identity, then the session with
/// its store subscriptions. On any failure the previous session is gone and later
/// calls answer `no_workspace`.
fn open_workspace(
    state: &mut AppState,
    req: &Request,
    path: &Path,
    provided_user: Option<&str>,
) -> Result<(), serde_json::Value> {
    state.session = None;
    state.workspace = None;

    let cfg = config::load_workspace_config(path).map_err(|e| failure(req, "config_invalid", e))?;
    let conn = db::open_db(path).map_err(|e| failure(req, "db_open_failed", e))?;
    let identity = identity::resolve_identity(&conn, provided_user)
        .map_err(|e| failure(req, "identity_failed", e))?;
    let session = Session::start(
        path.to_path_buf(),
        identity,
        cfg,
        DocumentStore::new(conn),
    )
    .map_err(|e| failure(req, "db_query_failed", e))?;

    state.workspace = Some(path.to_path_buf());
    state.session = Some(session);
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    let provided_user = req.params.get("userId").and_then(|v| v.as_str());

    if let Err(e) = open_workspace(state, req, &path, provided_user) {
        return e;
    }
    match state.session.as_ref() {
        Some(s) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "userId": s.user_id(),
                "identitySource": s.identity.source,
            }),
        ),
        None => err(&req.id, "no_workspace", "workspace did not open", None),
    }
}

fn handle_session_info(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "workspacePath": s.workspace.to_string_lossy(),
            "userId": s.user_id(),
            "identitySource": s.identity.source,
            "config": s.config,
            "subjectMax": s.config.limits.subject_max(),
            "collections": {
                "students": s.collection_path(CollectionName::Students).as_str(),
                "config": s.collection_path(CollectionName::Config).as_str(),
            },
            "studentCount": s.students().len(),
            "subjectCount": s.subjects().len(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "session.info" => Some(handle_session_info(state, req)),
        _ => None,
    }
}
