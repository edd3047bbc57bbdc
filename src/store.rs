use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionName {
    Students,
    Config,
}

impl CollectionName {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionName::Students => "students",
            CollectionName::Config => "config",
        }
    }

    pub fn parse(s: &str) -> Option<CollectionName> {
        match s.trim().to_ascii_lowercase().as_str() {
            "students" => Some(CollectionName::Students),
            "config" => Some(CollectionName::Config),
            _ => None,
        }
    }
}

/// A collection already scoped to one user: `users/<userId>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPath {
    path: String,
}

impl CollectionPath {
    pub fn scoped(user_id: &str, name: CollectionName) -> Self {
        Self {
            path: format!("users/{}/{}", user_id, name.as_str()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub key: String,
    pub data: serde_json::Value,
}

/// Full contents of one collection at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub collection: String,
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.documents.iter().find(|d| d.key == key).map(|d| &d.data)
    }
}

pub type Listener = Box<dyn FnMut(&Snapshot)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Keyed document store over the workspace database. Writes replace whole records
/// (last write wins) and every write pushes a fresh snapshot to the collection's
/// listeners.
pub struct DocumentStore {
    conn: Connection,
    listeners: Vec<(SubscriptionId, String, Listener)>,
    next_subscription: u64,
}

impl DocumentStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            listeners: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn snapshot(&self, coll: &CollectionPath) -> anyhow::Result<Snapshot> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, body FROM documents WHERE collection = ? ORDER BY key")?;
        let rows = stmt
            .query_map([coll.as_str()], |r| {
                let key: String = r.get(0)?;
                let body: String = r.get(1)?;
                Ok((key, body))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut documents = Vec::with_capacity(rows.len());
        for (key, body) in rows {
            let data: serde_json::Value = serde_json::from_str(&body)
                .with_context(|| format!("document {}/{} is not valid JSON", coll.as_str(), key))?;
            documents.push(Document { key, data });
        }
        Ok(Snapshot {
            collection: coll.as_str().to_string(),
            documents,
        })
    }

    pub fn get(&self, coll: &CollectionPath, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ? AND key = ?",
                (coll.as_str(), key),
                |r| r.get(0),
            )
            .optional()?;
        match body {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn set(&mut self, coll: &CollectionPath, key: &str, record: &serde_json::Value) -> anyhow::Result<()> {
        let body = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO documents(collection, key, body, updated_at)
             VALUES(?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            (coll.as_str(), key, body),
        )?;
        tracing::debug!(collection = coll.as_str(), key, "document written");
        self.notify(coll);
        Ok(())
    }

    pub fn delete(&mut self, coll: &CollectionPath, key: &str) -> anyhow::Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM documents WHERE collection = ? AND key = ?",
            (coll.as_str(), key),
        )?;
        if removed > 0 {
            tracing::debug!(collection = coll.as_str(), key, "document deleted");
            self.notify(coll);
        }
        Ok(removed > 0)
    }

    /// Registers a listener and immediately delivers the current snapshot to it.
    pub fn subscribe(&mut self, coll: &CollectionPath, mut listener: Listener) -> anyhow::Result<SubscriptionId> {
        let snapshot = self.snapshot(coll)?;
        listener(&snapshot);
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, coll.as_str().to_string(), listener));
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _, _)| *sid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, coll: &CollectionPath) {
        if !self.listeners.iter().any(|(_, path, _)| path == coll.as_str()) {
            return;
        }
        // The write itself already succeeded; a failed re-read only costs the push.
        let snapshot = match self.snapshot(coll) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(collection = coll.as_str(), error = %format!("{e:#}"), "snapshot after write failed");
                return;
            }
        };
        for (_, path, listener) in self.listeners.iter_mut() {
            if path == coll.as_str() {
                listener(&snapshot);
            }
        }
    }
}
