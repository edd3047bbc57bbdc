use std::path::PathBuf;

use serde::Deserialize;

use crate::session::{Session, StoreEvent};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub session: Option<Session>,
}

impl AppState {
    /// Pending push notifications, emitted after the response that produced them.
    pub fn drain_events(&self) -> Vec<StoreEvent> {
        self.session
            .as_ref()
            .map(|s| s.drain_events())
            .unwrap_or_default()
    }
}
