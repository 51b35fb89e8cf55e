/*!
Each save attempt reports itself in the log: one status line per attempt, and
quality warnings at warn level.
*/

use std::io;
use std::sync::{Arc, Mutex};

use safestore_core::{DataKind, SafeStore, SaveOptions, StoreConfig};
use serde_json::{json, Value};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

/// Run `f` with a subscriber that records every event at debug and above
fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs.lines())
}

fn store_in(dir: &TempDir) -> SafeStore {
    SafeStore::from_config(StoreConfig {
        base_dir: Some(dir.path().to_path_buf()),
        ..StoreConfig::default()
    })
    .unwrap()
}

fn flights(n: usize) -> Value {
    Value::Array(
        (0..n)
            .map(|i| json!({"hora": format!("{:02}:{:02}", i / 60 % 24, i % 60), "terminal": "T1"}))
            .collect(),
    )
}

fn count_containing(lines: &[String], needle: &str) -> usize {
    lines.iter().filter(|line| line.contains(needle)).count()
}

#[test]
fn accepted_save_logs_one_status_line() {
    let temp_dir = TempDir::new().unwrap();

    let (result, lines) = with_captured_logs(|| {
        store_in(&temp_dir).save_value("vuelos.json", flights(6), DataKind::Flights, SaveOptions::default())
    });

    assert!(result.is_ok());
    assert_eq!(count_containing(&lines, "saved 6 items to vuelos.json"), 1, "{lines:#?}");
    assert_eq!(count_containing(&lines, "not saved"), 0, "{lines:#?}");
}

#[test]
fn rejected_save_logs_one_status_line() {
    let temp_dir = TempDir::new().unwrap();

    let (result, lines) = with_captured_logs(|| {
        store_in(&temp_dir).save_value(
            "licencias_totales.json",
            json!([{"precio": 150000}, {"precio": 152000}]),
            DataKind::Licenses,
            SaveOptions::new().with_min_items(3),
        )
    });

    assert!(result.is_err());
    let status: Vec<_> = lines.iter().filter(|line| line.contains("not saved")).collect();
    assert_eq!(status.len(), 1, "{lines:#?}");
    assert!(status[0].contains("ERROR"));
    assert!(status[0].contains("only 2 items (minimum: 3)"));
}

#[test]
fn unknown_artifact_logs_one_status_line() {
    let temp_dir = TempDir::new().unwrap();

    let (result, lines) = with_captured_logs(|| {
        let store = store_in(&temp_dir)
            .with_config(StoreConfig::pipeline_defaults())
            .unwrap();
        store.save_artifact("metro", json!([{"linea": "L1"}]))
    });

    assert!(result.is_err());
    assert_eq!(count_containing(&lines, "not saved"), 1, "{lines:#?}");
    assert_eq!(count_containing(&lines, "unknown artifact 'metro'"), 1, "{lines:#?}");
}

#[test]
fn volume_drop_is_logged_as_warning() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);
    store
        .save_value("vuelos.json", flights(100), DataKind::Flights, SaveOptions::default())
        .unwrap();

    let (result, lines) = with_captured_logs(|| {
        let store = store_in(&temp_dir);
        store.save_value("vuelos.json", flights(40), DataKind::Flights, SaveOptions::default())
    });

    assert_eq!(result.unwrap().items, 40);
    let warnings: Vec<_> = lines
        .iter()
        .filter(|line| line.contains("WARN") && line.contains("under half of the previous snapshot"))
        .collect();
    assert_eq!(warnings.len(), 1, "{lines:#?}");
    assert!(warnings[0].contains("40 items"));
    assert!(warnings[0].contains("100 items"));
    assert_eq!(count_containing(&lines, "saved 40 items to vuelos.json"), 1, "{lines:#?}");
}
