/*!
# SafeStore Core

Validation and guarded-write engine for the JSON snapshots the scraping
pipeline publishes (flights, trains, cruise schedules, license offers and the
license market feed).

A producer hands its finished payload to [`SafeStore`] exactly once per run.
The store:

- rejects empty, undersized or structurally malformed payloads
- compares the payload against the previous snapshot and warns on large drops
- copies the previous snapshot into a timestamped backup
- replaces the snapshot atomically, so a failed write never leaves a partial file

## Usage

```rust,no_run
use safestore_core::{DataKind, SafeStore, SaveOptions};
use serde_json::json;

let store = SafeStore::local();
let offers = json!([
    {"precio": 148000, "fuente": "milanuncios"},
    {"precio": 151500, "fuente": "wallapop"},
    {"precio": 149900, "fuente": "milanuncios"}
]);

let outcome = store.save_outcome(
    "licencias_totales.json",
    offers,
    DataKind::Licenses,
    SaveOptions::new().with_min_items(3),
);
println!("{}", outcome.message);
std::process::exit(outcome.exit_code());
```
*/

pub mod backup;
pub mod config;
pub mod error;
pub mod observability;
pub mod payload;
pub mod receipt;
pub mod storage;
pub mod store;
pub mod validation;

#[cfg(test)]
mod error_tests;

pub use backup::{BackupEntry, BackupManager};
pub use config::{ArtifactProfile, RetentionPolicy, SaveOptions, StoreConfig};
pub use error::{FailureKind, Result, StoreError};
pub use payload::{DataKind, Payload, Record};
pub use receipt::{QualityWarning, SaveOutcome, SaveReceipt};
pub use storage::{LocalFileStorage, StorageAdapter};
pub use store::{check_payload, SafeStore};
pub use validation::{validate, validator_for, PayloadValidator, Verdict};
