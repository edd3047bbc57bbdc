use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{failure, required_str, session_mut};
use crate::ipc::types::{AppState, Request};
use crate::store::CollectionName;

fn collection_param(req: &Request) -> Result<CollectionName, serde_json::Value> {
    let raw = required_str(req, "collection")?;
    CollectionName::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "collection must be one of: students, config",
            Some(json!({ "collection": raw })),
        )
    })
}

fn handle_store_subscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match collection_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match s.subscribe_client(name) {
        Ok(subscribed) => ok(
            &req.id,
            json!({
                "collection": name.as_str(),
                "path": s.collection_path(name).as_str(),
                "subscribed": subscribed,
            }),
        ),
        Err(e) => failure(req, "db_query_failed", e),
    }
}

fn handle_store_unsubscribe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match collection_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let s = match session_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let removed = s.unsubscribe_client(name);
    ok(
        &req.id,
        json!({ "collection": name.as_str(), "removed": removed }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "store.subscribe" => Some(handle_store_subscribe(state, req)),
        "store.unsubscribe" => Some(handle_store_unsubscribe(state, req)),
        _ => None,
    }
}
