use chrono::NaiveDate;
use serde_json::json;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use crate::student::EntryError;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn session<'a>(state: &'a AppState, req: &Request) -> Result<&'a Session, serde_json::Value> {
    state
        .session
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn session_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut Session, serde_json::Value> {
    state
        .session
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn entry_err(req: &Request, e: EntryError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

/// Store and file failures are logged here once; the client gets the envelope and
/// decides whether to retry.
pub fn failure(req: &Request, code: &str, e: anyhow::Error) -> serde_json::Value {
    let message = format!("{e:#}");
    tracing::error!(method = %req.method, code, error = %message, "operation failed");
    err(&req.id, code, message, None)
}

/// `params.date` (YYYY-MM-DD) when given, otherwise today's local date.
pub fn report_date(req: &Request) -> Result<NaiveDate, serde_json::Value> {
    match req.params.get("date").and_then(|v| v.as_str()) {
        None => Ok(chrono::Local::now().date_naive()),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            err(
                &req.id,
                "bad_params",
                "date must be YYYY-MM-DD",
                Some(json!({ "date": s })),
            )
        }),
    }
}
