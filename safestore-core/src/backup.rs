/*!
Timestamped backups of snapshots and their retention.

A snapshot at `dir/name.ext` is backed up to
`dir/backups/name_YYYYMMDD_HHMMSS.ext`. Backups are never rewritten: if the
second-granularity name is already taken, a `-N` counter is appended to the
timestamp.
*/

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use crate::config::{RetentionPolicy, DEFAULT_BACKUP_DIR};
use crate::storage::StorageAdapter;
use crate::Result;

/// Timestamp format embedded in backup file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A backup file found next to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub taken_at: NaiveDateTime,
    /// Collision counter; 1 for the first backup taken in a given second
    pub sequence: u32,
}

/// Creates, lists and prunes the backups of snapshot files.
pub struct BackupManager<'a, S: StorageAdapter + ?Sized> {
    storage: &'a S,
    dir_name: String,
}

impl<'a, S: StorageAdapter + ?Sized> BackupManager<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self::with_dir_name(storage, DEFAULT_BACKUP_DIR)
    }

    pub fn with_dir_name(storage: &'a S, dir_name: impl Into<String>) -> Self {
        Self {
            storage,
            dir_name: dir_name.into(),
        }
    }

    /// Directory holding the backups of `snapshot`
    pub fn backup_dir(&self, snapshot: &Path) -> PathBuf {
        match snapshot.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(&self.dir_name),
            _ => PathBuf::from(&self.dir_name),
        }
    }

    /// First free backup path for `snapshot` taken at `at`
    pub fn backup_path_for(&self, snapshot: &Path, at: NaiveDateTime) -> PathBuf {
        let (stem, ext) = split_name(snapshot);
        let dir = self.backup_dir(snapshot);
        let stamp = at.format(TIMESTAMP_FORMAT);

        let first = dir.join(format!("{stem}_{stamp}{ext}"));
        if !self.storage.exists(&first) {
            return first;
        }
        (2u32..)
            .map(|n| dir.join(format!("{stem}_{stamp}-{n}{ext}")))
            .find(|candidate| !self.storage.exists(candidate))
            .unwrap_or(first)
    }

    /// Copy the current content of `snapshot` into a new backup file
    pub fn create(&self, snapshot: &Path, at: NaiveDateTime) -> Result<PathBuf> {
        let backup_path = self.backup_path_for(snapshot, at);
        self.storage.copy(snapshot, &backup_path)?;
        debug!(
            snapshot = %snapshot.display(),
            backup = %backup_path.display(),
            "Backup copied"
        );
        Ok(backup_path)
    }

    /// Backups of `snapshot`, newest first
    pub fn list(&self, snapshot: &Path) -> Result<Vec<BackupEntry>> {
        let (stem, ext) = split_name(snapshot);
        let mut entries: Vec<BackupEntry> = self
            .storage
            .list(&self.backup_dir(snapshot))?
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?.to_owned();
                let (taken_at, sequence) = parse_backup_name(&name, &stem, &ext)?;
                Some(BackupEntry {
                    path,
                    taken_at,
                    sequence,
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            b.taken_at
                .cmp(&a.taken_at)
                .then(b.sequence.cmp(&a.sequence))
        });
        Ok(entries)
    }

    /// Delete the backups of `snapshot` that `policy` does not retain
    ///
    /// # Returns
    /// The paths that were removed
    pub fn prune(
        &self,
        snapshot: &Path,
        policy: &RetentionPolicy,
        now: NaiveDateTime,
    ) -> Result<Vec<PathBuf>> {
        policy.validate()?;
        if policy.is_unbounded() {
            return Ok(Vec::new());
        }

        let cutoff = policy
            .max_age_days
            .map(|days| now - Duration::days(i64::from(days)));

        let mut removed = Vec::new();
        for (index, entry) in self.list(snapshot)?.into_iter().enumerate() {
            let over_count = policy.max_count.is_some_and(|max| index >= max);
            let too_old = cutoff.is_some_and(|cutoff| entry.taken_at < cutoff);
            if over_count || too_old {
                self.storage.remove(&entry.path)?;
                removed.push(entry.path);
            }
        }
        Ok(removed)
    }
}

/// Split a snapshot path into its file stem and extension (with the dot).
fn split_name(snapshot: &Path) -> (String, String) {
    let stem = snapshot
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = snapshot
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

fn parse_backup_name(name: &str, stem: &str, ext: &str) -> Option<(NaiveDateTime, u32)> {
    let middle = name
        .strip_prefix(stem)?
        .strip_prefix('_')?
        .strip_suffix(ext)?;

    let (stamp, sequence) = match middle.split_once('-') {
        Some((stamp, counter)) => (stamp, counter.parse::<u32>().ok().filter(|n| *n >= 2)?),
        None => (middle, 1),
    };
    let taken_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((taken_at, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, day)
            .unwrap()
            .and_hms_opt(hour, min, sec)
            .unwrap()
    }

    #[test]
    fn test_backup_path_naming() {
        let storage = MemoryStorage::new();
        let manager = BackupManager::new(&storage);
        let path = manager.backup_path_for(Path::new("public/vuelos.json"), at(5, 13, 4, 9));
        assert_eq!(path, PathBuf::from("public/backups/vuelos_20260105_130409.json"));
    }

    #[test]
    fn test_backup_path_without_parent_or_extension() {
        let storage = MemoryStorage::new();
        let manager = BackupManager::new(&storage);
        let path = manager.backup_path_for(Path::new("history"), at(1, 0, 0, 0));
        assert_eq!(path, PathBuf::from("backups/history_20260101_000000"));
    }

    #[test]
    fn test_backup_path_avoids_collisions() {
        let storage = MemoryStorage::new();
        storage.insert("public/web_feed.json", "{}");
        let manager = BackupManager::new(&storage);
        let snapshot = Path::new("public/web_feed.json");

        let first = manager.create(snapshot, at(2, 9, 0, 0)).unwrap();
        let second = manager.create(snapshot, at(2, 9, 0, 0)).unwrap();
        assert_eq!(first, PathBuf::from("public/backups/web_feed_20260102_090000.json"));
        assert_eq!(second, PathBuf::from("public/backups/web_feed_20260102_090000-2.json"));
    }

    #[test]
    fn test_create_copies_content() {
        let storage = MemoryStorage::new();
        storage.insert("public/cruceros.json", r#"{"llegadas": []}"#);
        let manager = BackupManager::new(&storage);

        let backup = manager
            .create(Path::new("public/cruceros.json"), at(3, 10, 0, 0))
            .unwrap();
        assert_eq!(storage.get(&backup).unwrap(), br#"{"llegadas": []}"#.to_vec());
    }

    #[test]
    fn test_list_ignores_other_snapshots() {
        let storage = MemoryStorage::new();
        storage.insert("public/backups/vuelos_20260101_000000.json", "[]");
        storage.insert("public/backups/vuelos_20260103_000000.json", "[]");
        storage.insert("public/backups/vuelos_20260103_000000-2.json", "[]");
        storage.insert("public/backups/vuelos_llegadas_20260102_000000.json", "[]");
        storage.insert("public/backups/vuelos_20260102_000000.csv", "");
        storage.insert("public/backups/vuelos_garbage.json", "[]");
        let manager = BackupManager::new(&storage);

        let entries = manager.list(Path::new("public/vuelos.json")).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.path.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "vuelos_20260103_000000-2.json",
                "vuelos_20260103_000000.json",
                "vuelos_20260101_000000.json",
            ]
        );
    }

    #[test]
    fn test_prune_by_count() {
        let storage = MemoryStorage::new();
        for day in 1..=5 {
            storage.insert(format!("public/backups/data_2026010{day}_120000.json"), "[]");
        }
        let manager = BackupManager::new(&storage);

        let removed = manager
            .prune(
                Path::new("public/data.json"),
                &RetentionPolicy::keep_last(2),
                at(10, 0, 0, 0),
            )
            .unwrap();
        assert_eq!(removed.len(), 3);

        let kept = manager.list(Path::new("public/data.json")).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].taken_at, at(5, 12, 0, 0));
        assert_eq!(kept[1].taken_at, at(4, 12, 0, 0));
    }

    #[test]
    fn test_prune_by_age() {
        let storage = MemoryStorage::new();
        storage.insert("backups/feed_20260101_000000.json", "{}");
        storage.insert("backups/feed_20260109_000000.json", "{}");
        let manager = BackupManager::new(&storage);

        let policy = RetentionPolicy::default().with_max_age_days(3);
        let removed = manager
            .prune(Path::new("feed.json"), &policy, at(10, 0, 0, 0))
            .unwrap();
        assert_eq!(removed, vec![PathBuf::from("backups/feed_20260101_000000.json")]);
        assert!(storage.exists(Path::new("backups/feed_20260109_000000.json")));
    }

    #[test]
    fn test_prune_unbounded_keeps_everything() {
        let storage = MemoryStorage::new();
        storage.insert("backups/feed_20200101_000000.json", "{}");
        let manager = BackupManager::new(&storage);

        let removed = manager
            .prune(Path::new("feed.json"), &RetentionPolicy::unbounded(), at(10, 0, 0, 0))
            .unwrap();
        assert!(removed.is_empty());
        assert_eq!(storage.paths().len(), 1);
    }

    #[test]
    fn test_parse_backup_name_rejects_counter_one() {
        assert!(parse_backup_name("a_20260101_000000-1.json", "a", ".json").is_none());
        assert_eq!(
            parse_backup_name("a_20260101_000000-3.json", "a", ".json"),
            Some((at(1, 0, 0, 0), 3))
        );
    }
}
