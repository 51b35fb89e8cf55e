/*!
The guarded writer.

`SafeStore` decides whether a freshly produced payload may replace the last
known-good snapshot at a path. A save runs
`VALIDATING -> {REJECTED | BACKING_UP -> WRITING -> DONE | WRITE_FAILED}` and
never retries; retry policy belongs to the producer.
*/

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Span};

use crate::backup::BackupManager;
use crate::config::{SaveOptions, StoreConfig};
use crate::payload::{DataKind, Payload};
use crate::receipt::{content_hash, QualityWarning, SaveOutcome, SaveReceipt};
use crate::storage::{LocalFileStorage, StorageAdapter};
use crate::validation;
use crate::{Result, StoreError};

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Emptiness, volume and structural checks run before any write.
///
/// # Errors
/// * `StoreError::EmptyPayload` - empty sequence or empty record
/// * `StoreError::InsufficientVolume` - sequence shorter than `min_items`
/// * `StoreError::SchemaViolation` - the kind's validator rejected the payload
pub fn check_payload(kind: DataKind, payload: &Payload, options: &SaveOptions) -> Result<()> {
    match payload {
        Payload::Sequence(records) => {
            if records.is_empty() {
                return Err(StoreError::empty("sequence payload has no records"));
            }
            if let Some(min) = options.min_items {
                if records.len() < min {
                    return Err(StoreError::InsufficientVolume {
                        count: records.len(),
                        min,
                    });
                }
            }
        }
        Payload::Record(record) => {
            if record.is_empty() {
                return Err(StoreError::empty("record payload has no keys"));
            }
        }
    }

    validation::validate(kind, payload).map_err(|reason| StoreError::schema(kind, reason))
}

/// Validation and guarded-write engine for snapshot files
///
/// # Example
/// ```rust,no_run
/// use safestore_core::{DataKind, SafeStore, SaveOptions};
/// use serde_json::json;
///
/// let store = SafeStore::local();
/// let vuelos = json!([{"hora": "10:05", "terminal": "T1", "origen": "Madrid"}]);
///
/// let outcome = store.save_outcome("public/vuelos.json", vuelos, DataKind::Flights, SaveOptions::default());
/// if !outcome.ok {
///     std::process::exit(outcome.exit_code());
/// }
/// ```
pub struct SafeStore<S: StorageAdapter = LocalFileStorage> {
    storage: S,
    config: StoreConfig,
    span: Span,
    clock: fn() -> NaiveDateTime,
}

impl SafeStore<LocalFileStorage> {
    /// A store on the local filesystem with default settings
    pub fn local() -> Self {
        SafeStore::new(LocalFileStorage::new())
    }

    /// A store on the local filesystem configured by `config`
    pub fn from_config(config: StoreConfig) -> Result<Self> {
        let storage = match &config.base_dir {
            Some(base) => LocalFileStorage::with_base_dir(base),
            None => LocalFileStorage::new(),
        };
        SafeStore::new(storage).with_config(config)
    }
}

impl<S: StorageAdapter> SafeStore<S> {
    /// Create a store over `storage` with the default configuration
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: StoreConfig::default(),
            span: info_span!("safe_store"),
            clock: local_now,
        }
    }

    /// Replace the configuration after validating it
    pub fn with_config(mut self, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Emit every event of this store inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Override the clock used to timestamp backups
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Backup manager over this store's storage and backup directory name
    pub fn backups(&self) -> BackupManager<'_, S> {
        BackupManager::with_dir_name(&self.storage, self.config.backup_dir_name.clone())
    }

    /// Run the pre-write checks on a raw value without touching storage
    pub fn validate_only(&self, kind: DataKind, value: Value, options: &SaveOptions) -> Result<Payload> {
        let payload = Payload::from_value(value)?;
        if !options.force {
            check_payload(kind, &payload, options)?;
        }
        Ok(payload)
    }

    /// Validate `payload` and, if it passes, replace the snapshot at `path`
    ///
    /// Logs exactly one status line for the attempt.
    ///
    /// # Errors
    /// * `StoreError::EmptyPayload`, `InsufficientVolume`, `SchemaViolation` -
    ///   the payload was rejected; the snapshot is untouched
    /// * `StoreError::IoFailure` - the write failed; the snapshot is untouched
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        payload: &Payload,
        kind: DataKind,
        options: SaveOptions,
    ) -> Result<SaveReceipt> {
        let path = path.as_ref();
        let _entered = self.span.enter();
        let result = self.guarded_write(path, payload, kind, &options);
        self.report(path, Some(kind), &result);
        result
    }

    /// Like [`save`](Self::save) for a raw JSON value
    ///
    /// Values that are neither an array of objects nor an object are
    /// rejected at the boundary, even with `force`.
    pub fn save_value(
        &self,
        path: impl AsRef<Path>,
        value: Value,
        kind: DataKind,
        options: SaveOptions,
    ) -> Result<SaveReceipt> {
        let path = path.as_ref();
        let _entered = self.span.enter();
        let result = Payload::from_value(value)
            .and_then(|payload| self.guarded_write(path, &payload, kind, &options));
        self.report(path, Some(kind), &result);
        result
    }

    /// The `(ok, message)` form of [`save_value`](Self::save_value)
    pub fn save_outcome(
        &self,
        path: impl AsRef<Path>,
        value: Value,
        kind: DataKind,
        options: SaveOptions,
    ) -> SaveOutcome {
        SaveOutcome::from(self.save_value(path, value, kind, options))
    }

    /// Save to a named artifact from the configuration
    pub fn save_artifact(&self, name: &str, value: Value) -> Result<SaveReceipt> {
        let Some(artifact) = self.config.artifact(name) else {
            let _entered = self.span.enter();
            let result = Err(StoreError::config(format!("unknown artifact '{name}'")));
            self.report(Path::new(name), None, &result);
            return result;
        };
        self.save_value(
            &artifact.path,
            value,
            artifact.kind,
            artifact.save_options(),
        )
    }

    /// Load the snapshot at `path`, `None` if there is none
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Option<Value>> {
        match self.storage.read(path.as_ref())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load the snapshot at `path`, or `default` if it is missing or unreadable
    pub fn load_or_default(&self, path: impl AsRef<Path>, default: Value) -> Value {
        let path = path.as_ref();
        match self.load(path) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                let _entered = self.span.enter();
                warn!(path = %path.display(), error = %e, "Snapshot unreadable, using default");
                default
            }
        }
    }

    fn guarded_write(
        &self,
        path: &Path,
        payload: &Payload,
        kind: DataKind,
        options: &SaveOptions,
    ) -> Result<SaveReceipt> {
        if options.force {
            warn!(path = %path.display(), %kind, "Validation bypassed by force");
        } else {
            check_payload(kind, payload, options)?;
        }
        debug!(path = %path.display(), %kind, items = payload.item_count(), "Payload accepted");

        let mut warnings = Vec::new();
        let previous = self.read_previous(path, &mut warnings);

        if let (Some(Value::Array(old)), Payload::Sequence(new)) = (&previous, payload) {
            if (new.len() as f64) < old.len() as f64 * self.config.quality_ratio {
                let warning = QualityWarning::VolumeDrop {
                    previous: old.len(),
                    current: new.len(),
                };
                warn!(path = %path.display(), "{warning}");
                warnings.push(warning);
            }
        }

        let backup = if options.backup && previous.is_some() {
            self.backup_previous(path, &mut warnings)
        } else {
            None
        };

        let bytes = self.serialize(payload)?;
        self.storage.write_atomic(path, &bytes)?;

        Ok(SaveReceipt {
            path: path.to_path_buf(),
            kind,
            items: payload.item_count(),
            bytes_written: bytes.len(),
            content_hash: content_hash(&bytes),
            backup,
            forced: options.force,
            warnings,
        })
    }

    /// Previous snapshot, or `None` if there is none or it cannot be used as a baseline
    fn read_previous(&self, path: &Path, warnings: &mut Vec<QualityWarning>) -> Option<Value> {
        let bytes = match self.storage.read(path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read existing snapshot");
                warnings.push(QualityWarning::UnreadablePrevious {
                    reason: e.to_string(),
                });
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Existing snapshot is not valid JSON");
                warnings.push(QualityWarning::UnreadablePrevious {
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn backup_previous(
        &self,
        path: &Path,
        warnings: &mut Vec<QualityWarning>,
    ) -> Option<std::path::PathBuf> {
        let manager = self.backups();
        let now = (self.clock)();

        match manager.create(path, now) {
            Ok(backup_path) => {
                info!(backup = %backup_path.display(), "Backup created");
                #[cfg(feature = "metrics")]
                crate::observability::SafeStoreMetrics::global().record_backup();

                if !self.config.retention.is_unbounded() {
                    match manager.prune(path, &self.config.retention, now) {
                        Ok(removed) if !removed.is_empty() => {
                            info!(removed = removed.len(), "Old backups pruned");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Backup pruning failed"),
                    }
                }
                Some(backup_path)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Backup failed, continuing with write");
                #[cfg(feature = "metrics")]
                crate::observability::SafeStoreMetrics::global().record_backup_failure();
                warnings.push(QualityWarning::BackupFailed {
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn serialize(&self, payload: &Payload) -> Result<Vec<u8>> {
        let indent = vec![b' '; self.config.indent];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
        let mut buffer = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        payload.serialize(&mut serializer)?;
        Ok(buffer)
    }

    fn report(&self, path: &Path, kind: Option<DataKind>, result: &Result<SaveReceipt>) {
        let kind = kind.map(DataKind::as_str);
        match result {
            Ok(receipt) => {
                info!(
                    path = %path.display(),
                    kind,
                    items = receipt.items,
                    bytes = receipt.bytes_written,
                    "{}",
                    receipt.status_line()
                );
                #[cfg(feature = "metrics")]
                crate::observability::SafeStoreMetrics::global().record_saved(receipt.items);
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    kind,
                    failure = %e.failure_kind(),
                    "not saved: {e}"
                );
                #[cfg(feature = "metrics")]
                crate::observability::SafeStoreMetrics::global().record_rejected(e.failure_kind());
            }
        }
    }
}
