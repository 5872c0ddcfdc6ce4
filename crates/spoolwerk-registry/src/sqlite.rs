// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent configuration store backed by SQLite.
//
// Holds the registered monitors with their ports and values, the printer
// queues, user forms, port redirections and the DOS device map.  Monitor and
// port names use `COLLATE NOCASE`; printer and form names are exact.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::store::{ConfigStore, MonitorEntry, PrinterEntry};
use spoolwerk_core::types::{FormArea, FormInfo, PrinterAttributes};

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS monitors (
        name TEXT PRIMARY KEY COLLATE NOCASE,
        driver TEXT NOT NULL,
        environment TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS monitor_ports (
        monitor TEXT NOT NULL COLLATE NOCASE,
        port TEXT NOT NULL COLLATE NOCASE,
        PRIMARY KEY (monitor, port)
    );
    CREATE TABLE IF NOT EXISTS monitor_values (
        monitor TEXT NOT NULL COLLATE NOCASE,
        key TEXT NOT NULL COLLATE NOCASE,
        value TEXT NOT NULL,
        PRIMARY KEY (monitor, key)
    );
    CREATE TABLE IF NOT EXISTS printers (
        name TEXT PRIMARY KEY,
        port TEXT,
        print_processor TEXT,
        datatype TEXT,
        attributes INTEGER NOT NULL DEFAULT 0,
        devmode BLOB
    );
    CREATE TABLE IF NOT EXISTS forms (
        name TEXT PRIMARY KEY,
        flags INTEGER NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        area_left INTEGER NOT NULL,
        area_top INTEGER NOT NULL,
        area_right INTEGER NOT NULL,
        area_bottom INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS port_redirects (
        port TEXT PRIMARY KEY COLLATE NOCASE,
        target TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS dos_devices (
        name TEXT PRIMARY KEY COLLATE NOCASE,
        path TEXT NOT NULL
    );
"#;

/// [`ConfigStore`] backed by a SQLite database.
///
/// The connection is guarded by a mutex so the store can be shared between
/// the threads calling into the provider.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db(context: &str) -> impl FnOnce(rusqlite::Error) -> SpoolError + '_ {
    move |e| SpoolError::Database(format!("{context}: {e}"))
}

impl SqliteStore {
    /// Open (or create) the configuration database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db("open"))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db("WAL pragma"))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(db("create tables"))?;
        info!("configuration database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db("open in-memory"))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(db("create tables"))?;
        debug!("in-memory configuration database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn strings(&self, sql: &str, arg: &str, context: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql).map_err(db(context))?;
        let rows = stmt
            .query_map(params![arg], |row| row.get::<_, String>(0))
            .map_err(db(context))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db(context))
    }
}

impl ConfigStore for SqliteStore {
    fn monitor_names(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM monitors ORDER BY rowid")
            .map_err(db("list monitors"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db("list monitors"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("list monitors"))
    }

    fn monitor(&self, name: &str) -> Result<Option<MonitorEntry>> {
        self.conn()
            .query_row(
                "SELECT name, driver, environment FROM monitors WHERE name = ?1",
                params![name],
                |row| {
                    Ok(MonitorEntry {
                        name: row.get(0)?,
                        driver: row.get(1)?,
                        environment: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(db("get monitor"))
    }

    #[instrument(skip(self, entry), fields(monitor = %entry.name))]
    fn add_monitor(&self, entry: &MonitorEntry) -> Result<()> {
        let conn = self.conn();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM monitors WHERE name = ?1)",
                params![entry.name],
                |row| row.get(0),
            )
            .map_err(db("probe monitor"))?;
        if exists {
            return Err(SpoolError::AlreadyExists(entry.name.clone()));
        }
        conn.execute(
            "INSERT INTO monitors (name, driver, environment) VALUES (?1, ?2, ?3)",
            params![entry.name, entry.driver, entry.environment],
        )
        .map_err(db("insert monitor"))?;
        debug!("monitor registered");
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_monitor(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db("begin"))?;
        let removed = tx
            .execute("DELETE FROM monitors WHERE name = ?1", params![name])
            .map_err(db("delete monitor"))?;
        tx.execute("DELETE FROM monitor_ports WHERE monitor = ?1", params![name])
            .map_err(db("delete monitor ports"))?;
        tx.execute("DELETE FROM monitor_values WHERE monitor = ?1", params![name])
            .map_err(db("delete monitor values"))?;
        tx.commit().map_err(db("commit"))?;
        Ok(removed > 0)
    }

    fn monitor_ports(&self, monitor: &str) -> Result<Vec<String>> {
        self.strings(
            "SELECT port FROM monitor_ports WHERE monitor = ?1 ORDER BY rowid",
            monitor,
            "list ports",
        )
    }

    fn add_monitor_port(&self, monitor: &str, port: &str) -> Result<()> {
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO monitor_ports (monitor, port) VALUES (?1, ?2)",
                params![monitor, port],
            )
            .map_err(db("insert port"))?;
        if inserted == 0 {
            return Err(SpoolError::AlreadyExists(port.to_string()));
        }
        Ok(())
    }

    fn delete_monitor_port(&self, monitor: &str, port: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM monitor_ports WHERE monitor = ?1 AND port = ?2",
                params![monitor, port],
            )
            .map_err(db("delete port"))?;
        Ok(removed > 0)
    }

    fn monitor_value(&self, monitor: &str, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM monitor_values WHERE monitor = ?1 AND key = ?2",
                params![monitor, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db("get monitor value"))
    }

    fn set_monitor_value(&self, monitor: &str, key: &str, value: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO monitor_values (monitor, key, value) VALUES (?1, ?2, ?3)",
                params![monitor, key, value],
            )
            .map_err(db("set monitor value"))?;
        Ok(())
    }

    fn printer(&self, name: &str) -> Result<Option<PrinterEntry>> {
        self.conn()
            .query_row(
                "SELECT name, port, print_processor, datatype, attributes, devmode
                 FROM printers WHERE name = ?1",
                params![name],
                |row| {
                    Ok(PrinterEntry {
                        name: row.get(0)?,
                        port: row.get(1)?,
                        print_processor: row.get(2)?,
                        datatype: row.get(3)?,
                        attributes: PrinterAttributes(row.get::<_, u32>(4)?),
                        devmode: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(db("get printer"))
    }

    #[instrument(skip(self, entry), fields(printer = %entry.name))]
    fn put_printer(&self, entry: &PrinterEntry) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO printers (name, port, print_processor, datatype, attributes, devmode)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(name) DO UPDATE SET
                    port = excluded.port,
                    print_processor = excluded.print_processor,
                    datatype = excluded.datatype,
                    attributes = excluded.attributes,
                    devmode = excluded.devmode",
                params![
                    entry.name,
                    entry.port,
                    entry.print_processor,
                    entry.datatype,
                    entry.attributes.bits(),
                    entry.devmode,
                ],
            )
            .map_err(db("put printer"))?;
        Ok(())
    }

    fn delete_printer(&self, name: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM printers WHERE name = ?1", params![name])
            .map_err(db("delete printer"))?;
        Ok(removed > 0)
    }

    fn printer_names(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM printers ORDER BY rowid")
            .map_err(db("list printers"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db("list printers"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("list printers"))
    }

    fn form_names(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM forms ORDER BY rowid")
            .map_err(db("list forms"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db("list forms"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("list forms"))
    }

    fn form(&self, name: &str) -> Result<Option<FormInfo>> {
        self.conn()
            .query_row(
                "SELECT name, flags, width, height, area_left, area_top, area_right, area_bottom
                 FROM forms WHERE name = ?1",
                params![name],
                |row| {
                    Ok(FormInfo {
                        name: row.get(0)?,
                        flags: row.get(1)?,
                        width: row.get(2)?,
                        height: row.get(3)?,
                        imageable: FormArea {
                            left: row.get(4)?,
                            top: row.get(5)?,
                            right: row.get(6)?,
                            bottom: row.get(7)?,
                        },
                    })
                },
            )
            .optional()
            .map_err(db("get form"))
    }

    #[instrument(skip(self, form), fields(form = %form.name))]
    fn add_form(&self, form: &FormInfo) -> Result<()> {
        let a = form.imageable;
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO forms
                    (name, flags, width, height, area_left, area_top, area_right, area_bottom)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![form.name, form.flags, form.width, form.height, a.left, a.top, a.right, a.bottom],
            )
            .map_err(db("insert form"))?;
        if inserted == 0 {
            return Err(SpoolError::AlreadyExists(form.name.clone()));
        }
        Ok(())
    }

    fn update_form(&self, form: &FormInfo) -> Result<bool> {
        let a = form.imageable;
        let changed = self
            .conn()
            .execute(
                "UPDATE forms SET flags = ?2, width = ?3, height = ?4,
                    area_left = ?5, area_top = ?6, area_right = ?7, area_bottom = ?8
                 WHERE name = ?1",
                params![form.name, form.flags, form.width, form.height, a.left, a.top, a.right, a.bottom],
            )
            .map_err(db("update form"))?;
        Ok(changed > 0)
    }

    fn delete_form(&self, name: &str) -> Result<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM forms WHERE name = ?1", params![name])
            .map_err(db("delete form"))?;
        Ok(removed > 0)
    }

    fn port_redirect(&self, port: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT target FROM port_redirects WHERE port = ?1",
                params![port],
                |row| row.get(0),
            )
            .optional()
            .map_err(db("get redirect"))
    }

    fn set_port_redirect(&self, port: &str, target: Option<&str>) -> Result<()> {
        let conn = self.conn();
        match target {
            Some(t) => conn.execute(
                "INSERT OR REPLACE INTO port_redirects (port, target) VALUES (?1, ?2)",
                params![port, t],
            ),
            None => conn.execute("DELETE FROM port_redirects WHERE port = ?1", params![port]),
        }
        .map_err(db("set redirect"))?;
        Ok(())
    }

    fn device_path(&self, dos_name: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT path FROM dos_devices WHERE name = ?1",
                params![dos_name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db("get device"))
    }

    fn set_device_path(&self, dos_name: &str, path: Option<&str>) -> Result<()> {
        let conn = self.conn();
        match path {
            Some(p) => conn.execute(
                "INSERT OR REPLACE INTO dos_devices (name, path) VALUES (?1, ?2)",
                params![dos_name, p],
            ),
            None => conn.execute("DELETE FROM dos_devices WHERE name = ?1", params![dos_name]),
        }
        .map_err(db("set device"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_port() -> MonitorEntry {
        MonitorEntry {
            name: "Local Port".into(),
            driver: "localspl".into(),
            environment: "Windows x64".into(),
        }
    }

    #[test]
    fn monitors_keep_insertion_order() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.add_monitor(&local_port()).expect("add");
        store
            .add_monitor(&MonitorEntry {
                name: "Another Port".into(),
                driver: "/opt/mon/libanother.so".into(),
                environment: "Windows x64".into(),
            })
            .expect("add");
        assert_eq!(
            store.monitor_names().expect("names"),
            vec!["Local Port".to_string(), "Another Port".to_string()]
        );
        assert!(matches!(
            store.add_monitor(&local_port()),
            Err(SpoolError::AlreadyExists(_))
        ));
    }

    #[test]
    fn ports_are_unique_per_monitor() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.add_monitor(&local_port()).expect("add");
        store.add_monitor_port("Local Port", "LPT1:").expect("port");
        assert!(matches!(
            store.add_monitor_port("local port", "lpt1:"),
            Err(SpoolError::AlreadyExists(_))
        ));
        assert_eq!(
            store.port_owner("LPT1:").expect("owner").as_deref(),
            Some("Local Port")
        );
        assert!(store.delete_monitor_port("Local Port", "LPT1:").expect("delete"));
        assert!(store.port_owner("LPT1:").expect("owner").is_none());
    }

    #[test]
    fn printer_round_trips_all_fields() {
        let store = SqliteStore::open_in_memory().expect("open");
        let mut entry = PrinterEntry::new("Office", "LPT1:", "winprint");
        entry.datatype = Some("RAW".into());
        entry.attributes = PrinterAttributes::LOCAL | PrinterAttributes::KEEP_PRINTED_JOBS;
        entry.devmode = Some(vec![1, 2, 3]);
        store.put_printer(&entry).expect("put");
        assert_eq!(store.printer("Office").expect("get"), Some(entry));
        assert!(store.printer("office").expect("get").is_none());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("spool.db");
        {
            let store = SqliteStore::open(&path).expect("open");
            store.add_monitor(&local_port()).expect("add");
            store.set_monitor_value("Local Port", "TransmissionRetryTimeout", "90").expect("value");
            store.set_device_path("LPT1:", Some("/dev/lp0")).expect("device");
            let mut label = FormInfo::new("Label", 100_000, 50_000);
            label.imageable.left = 2_000;
            store.add_form(&label).expect("form");
        }
        let store = SqliteStore::open(&path).expect("reopen");
        assert!(store.monitor("local port").expect("get").is_some());
        assert_eq!(
            store
                .monitor_value("Local Port", "TransmissionRetryTimeout")
                .expect("value")
                .as_deref(),
            Some("90")
        );
        assert_eq!(store.device_path("lpt1:").expect("device").as_deref(), Some("/dev/lp0"));
        let label = store.form("Label").expect("form").expect("stored");
        assert_eq!(label.imageable.left, 2_000);
        assert_eq!(label.imageable.bottom, 50_000);
    }

    #[test]
    fn form_names_are_exact() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.add_form(&FormInfo::new("Label", 100_000, 50_000)).expect("add");
        store.add_form(&FormInfo::new("label", 90_000, 40_000)).expect("distinct name");
        assert!(matches!(
            store.add_form(&FormInfo::new("Label", 1, 1)),
            Err(SpoolError::AlreadyExists(_))
        ));
        assert!(store.update_form(&FormInfo::new("Label", 110_000, 50_000)).expect("update"));
        assert_eq!(store.form("Label").expect("get").expect("stored").width, 110_000);
        assert!(!store.update_form(&FormInfo::new("Card", 1, 1)).expect("update"));
        assert!(store.delete_form("label").expect("delete"));
        assert_eq!(store.form_names().expect("names"), vec!["Label".to_string()]);
    }

    #[test]
    fn delete_monitor_clears_ports_and_values() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.add_monitor(&local_port()).expect("add");
        store.add_monitor_port("Local Port", "COM1:").expect("port");
        store.set_monitor_value("Local Port", "k", "v").expect("value");
        assert!(store.delete_monitor("Local Port").expect("delete"));
        assert!(store.monitor_ports("Local Port").expect("ports").is_empty());
        assert!(store.monitor_value("Local Port", "k").expect("value").is_none());
    }
}
