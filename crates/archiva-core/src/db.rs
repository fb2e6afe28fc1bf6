use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::Result;

/// Initialise the media-library schema in `conn`. Safe to call on every
/// startup — CREATE IF NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS libraries (
            id          TEXT    NOT NULL PRIMARY KEY,
            name        TEXT    NOT NULL UNIQUE,
            description TEXT,
            is_public   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS library_items (
            id          TEXT    NOT NULL PRIMARY KEY,
            library_id  TEXT    REFERENCES libraries(id),
            name        TEXT    NOT NULL UNIQUE,
            description TEXT,
            mime_type   TEXT    NOT NULL,
            file_size   INTEGER NOT NULL,
            file_path   TEXT    NOT NULL,
            is_public   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS thumbnails (
            id              TEXT    NOT NULL PRIMARY KEY,
            library_item_id TEXT,
            mime_type       TEXT    NOT NULL,
            file_size       INTEGER NOT NULL,
            file_path       TEXT    NOT NULL,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        -- Sweep queries join thumbnails back to their parent item.
        CREATE INDEX IF NOT EXISTS idx_thumbnails_item ON thumbnails (library_item_id);
        ",
    )?;
    Ok(())
}

/// Cloneable handle to the daemon's SQLite database.
///
/// Wraps a single `Connection` behind a mutex so periodic tasks and the
/// host's request handlers can share it. Tasks are read-mostly; anything
/// heavier should open its own connection the way the host does.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database with the full schema. Test fixture.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with the locked connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(f(&conn)?)
    }

    /// Row count of `table`. The name must come from code, never user input.
    pub fn count(&self, table: &str) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, u64>(0)
            })
        })
    }
}
