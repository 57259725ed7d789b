//! In-memory table store behind the `db` namespace.
//!
//! Only the `memory` driver exists.  Rows are stored as their rendered text,
//! one `Vec` per table, in insertion order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::script::{Callable, Namespace, Value};

pub const MEMORY_DRIVER: &str = "memory";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DbError {
    #[error("unsupported driver `{0}` (only `memory` is available)")]
    UnsupportedDriver(String),
    #[error("not connected; call db.connect first")]
    NotConnected,
}

#[derive(Debug, Default)]
struct DbState {
    url: Option<String>,
    tables: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MemoryDb {
    state: Mutex<DbState>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DbState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn connect(&self, driver: &str, url: &str) -> Result<(), DbError> {
        if !driver.eq_ignore_ascii_case(MEMORY_DRIVER) {
            return Err(DbError::UnsupportedDriver(driver.to_owned()));
        }
        self.lock().url = Some(url.to_owned());
        tracing::info!(%driver, %url, "database connected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.lock().url.is_some()
    }

    pub fn insert(&self, table: &str, row: String) -> Result<(), DbError> {
        let mut state = self.lock();
        if state.url.is_none() {
            return Err(DbError::NotConnected);
        }
        state.tables.entry(table.to_owned()).or_default().push(row);
        tracing::info!(%table, "inserted into {table}");
        Ok(())
    }

    pub fn count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, Vec::len)
    }

    pub fn rows(&self, table: &str) -> Vec<String> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }
}

/// Build the `db` namespace over `db`.
pub fn namespace(db: &Arc<MemoryDb>) -> Namespace {
    let connect = Arc::clone(db);
    let insert = Arc::clone(db);
    let count = Arc::clone(db);
    Namespace::new("db")
        .with(
            "connect",
            Callable::native2("db.connect", move |driver: String, url: String| {
                connect
                    .connect(&driver, &url)
                    .map(|()| "connected")
                    .map_err(|e| e.to_string())
            }),
        )
        .with(
            "insert",
            Callable::native2("db.insert", move |table: String, row: Value| {
                insert.insert(&table, row.to_string()).map_err(|e| e.to_string())
            }),
        )
        .with(
            "count",
            Callable::native1("db.count", move |table: String| Ok(count.count(&table))),
        )
}
