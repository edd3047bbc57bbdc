use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "markreg.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents(
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(collection, key)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
