use anyhow::Context;
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::config::AppConfig;
use crate::identity::Identity;
use crate::store::{CollectionName, CollectionPath, DocumentStore, Snapshot, SubscriptionId};
use crate::student::{sort_by_roll_no, Student, SubjectList, SubjectsDocument};

pub const SUBJECTS_DOC_KEY: &str = "subjects";

/// A full-snapshot change for a collection the client subscribed to.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub collection: CollectionName,
    pub snapshot: Snapshot,
}

impl StoreEvent {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "event": "store.changed",
            "collection": self.collection.as_str(),
            "path": self.snapshot.collection,
            "records": self.snapshot.documents,
        })
    }
}

#[derive(Debug, Default)]
struct SessionCache {
    students: Vec<Student>,
    subjects: SubjectList,
}

fn students_from_snapshot(snap: &Snapshot) -> Vec<Student> {
    let mut out = Vec::with_capacity(snap.documents.len());
    for doc in &snap.documents {
        match serde_json::from_value::<Student>(doc.data.clone()) {
            Ok(mut s) => {
                if s.id.is_empty() {
                    s.id = doc.key.clone();
                }
                out.push(s);
            }
            Err(e) => {
                tracing::warn!(key = %doc.key, error = %e, "skipping unreadable student record");
            }
        }
    }
    sort_by_roll_no(&mut out);
    out
}

fn subjects_from_snapshot(snap: &Snapshot, defaults: &[String]) -> SubjectList {
    snap.get(SUBJECTS_DOC_KEY)
        .and_then(|v| serde_json::from_value::<SubjectsDocument>(v.clone()).ok())
        .map(SubjectsDocument::into_list)
        .unwrap_or_else(|| SubjectList::from_names(defaults.iter().cloned()))
}

/// Everything bound to one opened workspace and user.
///
/// Reads are served from caches that the store replaces wholesale on every push, so a
/// report always works off the latest full snapshot.
pub struct Session {
    pub workspace: PathBuf,
    pub identity: Identity,
    pub config: AppConfig,
    store: DocumentStore,
    students_path: CollectionPath,
    config_path: CollectionPath,
    cache: Rc<RefCell<SessionCache>>,
    events_tx: Sender<StoreEvent>,
    events_rx: Receiver<StoreEvent>,
    client_subscriptions: HashMap<CollectionName, SubscriptionId>,
}

impl Session {
    pub fn start(
        workspace: PathBuf,
        identity: Identity,
        config: AppConfig,
        mut store: DocumentStore,
    ) -> anyhow::Result<Session> {
        let students_path = CollectionPath::scoped(&identity.user_id, CollectionName::Students);
        let config_path = CollectionPath::scoped(&identity.user_id, CollectionName::Config);

        seed_subjects(&mut store, &config_path, &config.default_subjects)?;

        let cache = Rc::new(RefCell::new(SessionCache::default()));
        let sink = cache.clone();
        store
            .subscribe(
                &students_path,
                Box::new(move |snap: &Snapshot| {
                    sink.borrow_mut().students = students_from_snapshot(snap);
                }),
            )
            .context("failed to load students")?;
        let sink = cache.clone();
        let defaults = config.default_subjects.clone();
        store
            .subscribe(
                &config_path,
                Box::new(move |snap: &Snapshot| {
                    sink.borrow_mut().subjects = subjects_from_snapshot(snap, &defaults);
                }),
            )
            .context("failed to load subject list")?;

        if cache.borrow().subjects.is_empty() {
            tracing::warn!("subject list is empty; every report will show zero totals");
        }
        let (events_tx, events_rx) = channel();
        tracing::info!(
            workspace = %workspace.display(),
            user_id = %identity.user_id,
            students = cache.borrow().students.len(),
            "session started"
        );
        Ok(Session {
            workspace,
            identity,
            config,
            store,
            students_path,
            config_path,
            cache,
            events_tx,
            events_rx,
            client_subscriptions: HashMap::new(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn collection_path(&self, name: CollectionName) -> &CollectionPath {
        match name {
            CollectionName::Students => &self.students_path,
            CollectionName::Config => &self.config_path,
        }
    }

    /// Students sorted by roll number.
    pub fn students(&self) -> Vec<Student> {
        self.cache.borrow().students.clone()
    }

    pub fn find_student(&self, id: &str) -> Option<Student> {
        self.cache
            .borrow()
            .students
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn subjects(&self) -> SubjectList {
        self.cache.borrow().subjects.clone()
    }

    pub fn save_student(&mut self, student: &Student) -> anyhow::Result<()> {
        let record = serde_json::to_value(student)?;
        self.store.set(&self.students_path, &student.id, &record)
    }

    pub fn delete_student(&mut self, id: &str) -> anyhow::Result<bool> {
        self.store.delete(&self.students_path, id)
    }

    pub fn save_subjects(&mut self, list: &SubjectList) -> anyhow::Result<()> {
        let record = serde_json::to_value(SubjectsDocument::from_list(list))?;
        self.store.set(&self.config_path, SUBJECTS_DOC_KEY, &record)
    }

    #[cfg(test)]
    pub fn snapshot(&self, name: CollectionName) -> anyhow::Result<Snapshot> {
        self.store.snapshot(self.collection_path(name))
    }

    /// Returns false when the client was already subscribed to the collection.
    pub fn subscribe_client(&mut self, name: CollectionName) -> anyhow::Result<bool> {
        if self.client_subscriptions.contains_key(&name) {
            return Ok(false);
        }
        let tx = self.events_tx.clone();
        let path = self.collection_path(name).clone();
        let id = self.store.subscribe(
            &path,
            Box::new(move |snap: &Snapshot| {
                let _ = tx.send(StoreEvent {
                    collection: name,
                    snapshot: snap.clone(),
                });
            }),
        )?;
        self.client_subscriptions.insert(name, id);
        Ok(true)
    }

    pub fn unsubscribe_client(&mut self, name: CollectionName) -> bool {
        match self.client_subscriptions.remove(&name) {
            Some(id) => self.store.unsubscribe(id),
            None => false,
        }
    }

    pub fn drain_events(&self) -> Vec<StoreEvent> {
        self.events_rx.try_iter().collect()
    }
}

/// Writes the default subject list the first time a user's config is read.
fn seed_subjects(
    store: &mut DocumentStore,
    config_path: &CollectionPath,
    defaults: &[String],
) -> anyhow::Result<()> {
    let existing = store
        .get(config_path, SUBJECTS_DOC_KEY)
        .context("failed to read subject list")?;
    let usable = existing
        .as_ref()
        .and_then(|v| v.get("subjectNames"))
        .map(|v| v.is_array())
        .unwrap_or(false);
    if usable {
        return Ok(());
    }
    let list = SubjectList::from_names(defaults.iter().cloned());
    store
        .set(
            config_path,
            SUBJECTS_DOC_KEY,
            &serde_json::to_value(SubjectsDocument::from_list(&list))?,
        )
        .context("failed to seed subject list")?;
    tracing::info!(subjects = list.len(), "seeded default subject list");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::identity::IdentitySource;
    use rusqlite::Connection;

    fn session() -> Session {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        Session::start(
            PathBuf::from("mem"),
            Identity {
                user_id: "u1".to_string(),
                source: IdentitySource::Provided,
            },
            AppConfig::default(),
            DocumentStore::new(conn),
        )
        .expect("start")
    }

    fn student(id: &str, roll: i64) -> Student {
        serde_json::from_value(json!({
            "id": id, "rollNo": roll, "name": id, "class": "1st"
        }))
        .expect("decode")
    }

    #[test]
    fn first_start_seeds_default_subjects() {
        let s = session();
        assert_eq!(s.subjects().len(), 7);
        let snap = s.snapshot(CollectionName::Config).expect("snapshot");
        assert_eq!(snap.documents[0].key, SUBJECTS_DOC_KEY);
        assert_eq!(snap.collection, "users/u1/config");
    }

    #[test]
    fn writes_refresh_the_cache_in_roll_order() {
        let mut s = session();
        s.save_student(&student("b", 9)).expect("save");
        s.save_student(&student("a", 2)).expect("save");
        let ids: Vec<String> = s.students().into_iter().map(|x| x.id).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(s.delete_student("b").expect("delete"));
        assert_eq!(s.students().len(), 1);
        assert!(s.find_student("b").is_none());
    }

    #[test]
    fn subject_changes_replace_the_cached_list() {
        let mut s = session();
        let mut list = s.subjects();
        assert!(list.add("Art"));
        assert!(list.remove("Math"));
        s.save_subjects(&list).expect("save");
        assert_eq!(s.subjects(), list);
    }

    #[test]
    fn client_subscription_queues_snapshots() {
        let mut s = session();
        assert!(s.subscribe_client(CollectionName::Students).expect("subscribe"));
        assert!(!s.subscribe_client(CollectionName::Students).expect("again"));
        s.save_student(&student("a", 1)).expect("save");
        let events = s.drain_events();
        assert_eq!(events.len(), 2);
        assert!(events[0].snapshot.documents.is_empty());
        assert_eq!(events[1].snapshot.documents.len(), 1);
        assert_eq!(events[1].to_json()["event"], "store.changed");
        assert!(s.unsubscribe_client(CollectionName::Students));
        s.save_student(&student("b", 2)).expect("save");
        assert!(s.drain_events().is_empty());
    }
}
