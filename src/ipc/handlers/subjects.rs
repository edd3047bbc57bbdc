use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{failure, session, session_mut};
use crate::ipc::types::{AppState, Request};

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = match session(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "subjects": s.subjects() }))
}

fn handle_subjects_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut list = s.subjects();
    let changed = list.add(&name);
    if changed {
        if let Err(e) = s.save_subjects(&list) {
            return failure(req, "db_update_failed", e);
        }
    }
    ok(&req.id, json!({ "subjects": s.subjects(), "changed": changed }))
}

fn handle_subjects_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut list = s.subjects();
    let changed = list.remove(&name);
    if changed {
        if let Err(e) = s.save_subjects(&list) {
            return failure(req, "db_update_failed", e);
        }
    }
    ok(&req.id, json!({ "subjects": s.subjects(), "changed": changed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.add" => Some(handle_subjects_add(state, req)),
        "subjects.remove" => Some(handle_subjects_remove(state, req)),
        _ => None,
    }
}
