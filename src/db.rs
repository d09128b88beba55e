use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, ScheduleError};
use crate::export::{self, ExportDocument};
use crate::snapshot::STORAGE_KEY;

/// Total bytes (keys plus values) the store accepts.
pub const QUOTA_BYTES: usize = 5 * 1024 * 1024;
const PROBE_KEY: &str = "test";

/// String key-value storage with browser-storage semantics.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;

    /// Write and remove a throwaway key to prove the store is usable.
    fn probe(&mut self) -> Result<()> {
        self.set(PROBE_KEY, PROBE_KEY)?;
        self.remove(PROBE_KEY)
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at TEXT NOT NULL)",
            [],
        )
        .context("create kv table")?;
        Ok(Self { conn })
    }

    fn used_bytes_except(&self, key: &str) -> Result<usize> {
        let used: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv WHERE key <> ?1",
                [key],
                |row| row.get(0),
            )
            .map_err(storage)?;
        Ok(used.max(0) as usize)
    }
}

fn storage(e: rusqlite::Error) -> ScheduleError {
    ScheduleError::StorageFailure(e.to_string())
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(storage)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let needed = self.used_bytes_except(key)? + key.len() + value.len();
        if needed > QUOTA_BYTES {
            return Err(ScheduleError::StorageFailure(format!(
                "quota exceeded: {needed} of {QUOTA_BYTES} bytes"
            )));
        }
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                params![key, value],
            )
            .map_err(storage)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(storage)?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum Request {
    /// Read the saved snapshot, if any.
    Load,
    Save {
        json: String,
    },
    ExportPdf {
        doc: Box<ExportDocument>,
    },
    Print {
        doc: Box<ExportDocument>,
    },
}

#[derive(Debug)]
pub enum Response {
    Loaded(Option<String>),
    Saved {
        ok: bool,
        message: Option<String>,
    },
    Exported {
        ok: bool,
        path: Option<PathBuf>,
        message: Option<String>,
    },
    Printed {
        ok: bool,
        message: Option<String>,
    },
    /// Storage could not be opened or probed; nothing will be saved.
    StorageUnavailable(String),
    Error(String),
}

/// Open the store at `path` and serve requests until the request channel closes.
pub fn start_worker(
    path: PathBuf,
    export_dir: PathBuf,
    req_rx: Receiver<Request>,
    resp_tx: Sender<Response>,
) {
    let store = match SqliteStore::open(&path) {
        Ok(store) => Some(Box::new(store) as Box<dyn KvStore + Send>),
        Err(e) => {
            log::error!("storage unavailable: {e:#}");
            let _ = resp_tx.send(Response::StorageUnavailable(format!("{e:#}")));
            None
        }
    };
    run_worker(store, &export_dir, req_rx, resp_tx);
}

pub fn run_worker(
    mut store: Option<Box<dyn KvStore + Send>>,
    export_dir: &Path,
    req_rx: Receiver<Request>,
    resp_tx: Sender<Response>,
) {
    if let Some(s) = store.as_mut()
        && let Err(e) = s.probe()
    {
        log::error!("storage probe failed: {e}");
        let _ = resp_tx.send(Response::StorageUnavailable(e.to_string()));
        store = None;
    }

    while let Ok(req) = req_rx.recv() {
        let resp = match req {
            Request::Load => match store.as_ref().map(|s| s.get(STORAGE_KEY)) {
                None => Response::Loaded(None),
                Some(Ok(raw)) => Response::Loaded(raw),
                Some(Err(e)) => Response::Error(e.to_string()),
            },
            Request::Save { json } => match store.as_mut() {
                None => Response::Saved {
                    ok: false,
                    message: Some("storage unavailable".into()),
                },
                Some(s) => match s.set(STORAGE_KEY, &json) {
                    Ok(()) => {
                        log::debug!("saved snapshot ({} bytes)", json.len());
                        Response::Saved { ok: true, message: None }
                    }
                    Err(e) => {
                        log::warn!("save failed: {e}");
                        Response::Saved {
                            ok: false,
                            message: Some(e.to_string()),
                        }
                    }
                },
            },
            Request::ExportPdf { doc } => match export::export_pdf(&doc, export_dir, Utc::now()) {
                Ok(path) => Response::Exported {
                    ok: true,
                    path: Some(path),
                    message: None,
                },
                Err(e) => {
                    log::error!("pdf export failed: {e}");
                    Response::Exported {
                        ok: false,
                        path: None,
                        message: Some(e.to_string()),
                    }
                }
            },
            Request::Print { doc } => match export::print(&doc, Utc::now()) {
                Ok(prog) => Response::Printed {
                    ok: true,
                    message: Some(format!("Sent to printer via {prog}")),
                },
                Err(e) => {
                    log::error!("print failed: {e}");
                    Response::Printed {
                        ok: false,
                        message: Some(e.to_string()),
                    }
                }
            },
        };
        if resp_tx.send(resp).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::thread;

    #[test]
    fn set_get_remove() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn probe_leaves_no_key_behind() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.probe().unwrap();
        assert_eq!(store.get(PROBE_KEY).unwrap(), None);
    }

    #[test]
    fn oversized_value_is_a_storage_failure() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.set(STORAGE_KEY, "small").unwrap();
        let big = "x".repeat(QUOTA_BYTES);
        assert!(matches!(
            store.set(STORAGE_KEY, &big),
            Err(ScheduleError::StorageFailure(_))
        ));
        assert_eq!(store.get(STORAGE_KEY).unwrap().as_deref(), Some("small"));
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        SqliteStore::open(&path).unwrap().set(STORAGE_KEY, "{}").unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get(STORAGE_KEY).unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn worker_saves_then_loads() {
        let (req_tx, req_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let store: Box<dyn KvStore + Send> = Box::new(SqliteStore::in_memory().unwrap());
        let handle = thread::spawn(move || run_worker(Some(store), Path::new("."), req_rx, resp_tx));

        req_tx.send(Request::Load).unwrap();
        assert!(matches!(resp_rx.recv().unwrap(), Response::Loaded(None)));

        req_tx.send(Request::Save { json: "{\"title\":\"T\"}".into() }).unwrap();
        assert!(matches!(resp_rx.recv().unwrap(), Response::Saved { ok: true, .. }));

        req_tx.send(Request::Load).unwrap();
        match resp_rx.recv().unwrap() {
            Response::Loaded(Some(raw)) => assert_eq!(raw, "{\"title\":\"T\"}"),
            other => panic!("unexpected {other:?}"),
        }

        drop(req_tx);
        handle.join().unwrap();
    }

    #[test]
    fn worker_without_store_reports_unsaved() {
        let (req_tx, req_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let handle = thread::spawn(move || run_worker(None, Path::new("."), req_rx, resp_tx));

        req_tx.send(Request::Save { json: "{}".into() }).unwrap();
        assert!(matches!(resp_rx.recv().unwrap(), Response::Saved { ok: false, .. }));
        req_tx.send(Request::Load).unwrap();
        assert!(matches!(resp_rx.recv().unwrap(), Response::Loaded(None)));

        drop(req_tx);
        handle.join().unwrap();
    }

    struct BrokenStore;

    impl KvStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<String>> {
            Err(ScheduleError::StorageFailure("disabled".into()))
        }
        fn set(&mut self, _: &str, _: &str) -> Result<()> {
            Err(ScheduleError::StorageFailure("disabled".into()))
        }
        fn remove(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_probe_is_announced_first() {
        let (req_tx, req_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let handle = thread::spawn(move || {
            run_worker(Some(Box::new(BrokenStore)), Path::new("."), req_rx, resp_tx)
        });
        assert!(matches!(resp_rx.recv().unwrap(), Response::StorageUnavailable(_)));
        drop(req_tx);
        handle.join().unwrap();
    }
}
