//! Reconciliation of a fresh source listing against stored file records.
//!
//! # Classification
//!
//! For each path in the current listing:
//!
//! | Stored record | Fingerprints | Result |
//! |---------------|--------------|--------|
//! | none | n/a | `new` (work) |
//! | status `deleted` | any | `restored` (work) |
//! | present | both present, differ | `modified` (work) |
//! | present | both present, equal | `unchanged` |
//! | present | either missing | `unknown` (work), see [`MissingFingerprintPolicy`] |
//!
//! Each stored path absent from the listing becomes `deleted`.
//!
//! The three buckets (work, unchanged, deleted) partition the union of
//! stored and current paths: every path lands in exactly one bucket.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{FileCounts, FileRecord, FileStatus, SourceFile, SyncStats};

/// What to do when a fingerprint is missing on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingFingerprintPolicy {
    /// Treat the file as `unknown` and reprocess it.
    #[default]
    Reprocess,
    /// When both sides lack a fingerprint, equal size and last-modified
    /// count as `unchanged`. Anything else is still `unknown`.
    CompareMetadata,
}

impl fmt::Display for MissingFingerprintPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingFingerprintPolicy::Reprocess => f.write_str("reprocess"),
            MissingFingerprintPolicy::CompareMetadata => f.write_str("compare-metadata"),
        }
    }
}

impl FromStr for MissingFingerprintPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reprocess" => Ok(Self::Reprocess),
            "compare-metadata" => Ok(Self::CompareMetadata),
            other => anyhow::bail!(
                "Unknown missing_fingerprint policy: '{}'. Supported: reprocess, compare-metadata",
                other
            ),
        }
    }
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Records to enrich: `new`, `modified`, `unknown` and `restored`.
    pub work: Vec<FileRecord>,
    /// Records whose stored enrichment is kept as-is.
    pub unchanged: Vec<FileRecord>,
    /// Stored records no longer present at the source.
    pub deleted: Vec<FileRecord>,
    /// Paths that were `deleted` in the store and reappeared.
    pub restored: HashSet<String>,
}

impl Reconciliation {
    /// Per-category counts. `failed` and `skipped` are left at zero; they
    /// are only known after enrichment.
    pub fn stats(&self) -> SyncStats {
        let mut stats = SyncStats {
            unchanged: self.unchanged.len() as u64,
            deleted: self.deleted.len() as u64,
            ..SyncStats::default()
        };
        for record in &self.work {
            match record.status {
                FileStatus::New => stats.new += 1,
                FileStatus::Modified => stats.modified += 1,
                FileStatus::Restored => stats.restored += 1,
                _ => stats.unknown += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.work.len() + self.unchanged.len() + self.deleted.len()
    }
}

fn classify(
    current: &SourceFile,
    stored: &FileRecord,
    policy: MissingFingerprintPolicy,
) -> FileStatus {
    if stored.status == FileStatus::Deleted {
        return FileStatus::Restored;
    }
    match (&current.fingerprint, &stored.fingerprint) {
        (Some(a), Some(b)) if a == b => FileStatus::Unchanged,
        (Some(_), Some(_)) => FileStatus::Modified,
        (None, None) if policy == MissingFingerprintPolicy::CompareMetadata => {
            let same_time = matches!(
                (current.last_modified, stored.last_modified),
                (Some(a), Some(b)) if a == b
            );
            if same_time && current.size == stored.size {
                FileStatus::Unchanged
            } else {
                FileStatus::Unknown
            }
        }
        _ => FileStatus::Unknown,
    }
}

/// Refresh an unchanged record with the listing's descriptive fields.
/// Enrichment, search fields and first-seen come from the store.
fn carry_over(stored: &FileRecord, current: SourceFile) -> FileRecord {
    let mut record = stored.clone();
    record.name = current.name;
    record.size = current.size;
    record.language = current.language.or(record.language);
    record.last_modified = current.last_modified.or(record.last_modified);
    record.last_change_summary = current.last_change_summary.or(record.last_change_summary);
    if !current.structure.is_empty() {
        record.structure = current.structure;
    }
    record.status = FileStatus::Unchanged;
    record.deleted_at = None;
    record
}

/// Diff `current` (the source listing) against `stored` (the store's view).
///
/// `now` stamps new work items and newly deleted records. Duplicate paths in
/// the listing keep their first occurrence.
pub fn reconcile(
    current: Vec<SourceFile>,
    stored: Vec<FileRecord>,
    policy: MissingFingerprintPolicy,
    now: DateTime<Utc>,
) -> Reconciliation {
    let mut stored_by_path: HashMap<String, FileRecord> =
        stored.into_iter().map(|r| (r.path.clone(), r)).collect();

    let mut out = Reconciliation::default();
    let mut seen: HashSet<String> = HashSet::new();

    for file in current {
        if !seen.insert(file.path.clone()) {
            tracing::debug!(path = %file.path, "duplicate path in listing ignored");
            continue;
        }
        match stored_by_path.remove(&file.path) {
            None => out.work.push(FileRecord::from_source(file, now)),
            Some(existing) => {
                let status = classify(&file, &existing, policy);
                if status == FileStatus::Unchanged {
                    out.unchanged.push(carry_over(&existing, file));
                    continue;
                }
                if status == FileStatus::Restored {
                    out.restored.insert(file.path.clone());
                }
                let mut record = FileRecord::from_source(file, now);
                record.status = status;
                record.first_seen_at = existing.first_seen_at;
                out.work.push(record);
            }
        }
    }

    // whatever is left in the map was not listed
    for (_, mut record) in stored_by_path {
        if record.status != FileStatus::Deleted {
            record.updated_at = now;
        }
        record.status = FileStatus::Deleted;
        record.deleted_at = record.deleted_at.or(Some(now));
        out.deleted.push(record);
    }

    out.work.sort_by(|a, b| a.path.cmp(&b.path));
    out.unchanged.sort_by(|a, b| a.path.cmp(&b.path));
    out.deleted.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// Combine enriched work items with the unchanged and deleted buckets into
/// the final record set. Restored records are persisted as `active`.
pub fn merge(
    processed: Vec<FileRecord>,
    unchanged: Vec<FileRecord>,
    deleted: Vec<FileRecord>,
) -> Vec<FileRecord> {
    let mut records = Vec::with_capacity(processed.len() + unchanged.len() + deleted.len());
    for mut record in processed {
        if record.status == FileStatus::Restored {
            record.status = FileStatus::Active;
        }
        record.deleted_at = None;
        records.push(record);
    }
    records.extend(unchanged);
    records.extend(deleted);
    records.sort_by(|a, b| a.path.cmp(&b.path));
    records
}

/// Active/deleted/total counts over a record set.
pub fn file_counts(records: &[FileRecord]) -> FileCounts {
    let deleted = records
        .iter()
        .filter(|r| r.status == FileStatus::Deleted)
        .count() as u64;
    let total = records.len() as u64;
    FileCounts {
        active: total - deleted,
        deleted,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CodeStructure;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn src(path: &str, sha: Option<&str>) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            size: 10,
            language: crate::language::detect_language(path),
            fingerprint: sha.map(str::to_string),
            last_modified: Some(ts(1_000)),
            last_change_summary: None,
            structure: CodeStructure::default(),
        }
    }

    fn stored(path: &str, sha: Option<&str>, status: FileStatus) -> FileRecord {
        let mut r = FileRecord::from_source(src(path, sha), ts(100));
        r.status = status;
        r
    }

    fn paths(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(|r| r.path.as_str()).collect()
    }

    #[test]
    fn add_keep_delete_scenario() {
        let stored = vec![
            stored("a.py", Some("sha1"), FileStatus::Active),
            stored("b.py", Some("sha1"), FileStatus::Active),
        ];
        let current = vec![src("a.py", Some("sha1")), src("c.py", Some("sha2"))];
        let rec = reconcile(current, stored, MissingFingerprintPolicy::Reprocess, ts(2_000));

        assert_eq!(paths(&rec.work), vec!["c.py"]);
        assert_eq!(rec.work[0].status, FileStatus::New);
        assert_eq!(rec.work[0].first_seen_at, ts(2_000));
        assert_eq!(paths(&rec.unchanged), vec!["a.py"]);
        assert_eq!(rec.unchanged[0].status, FileStatus::Unchanged);
        assert_eq!(rec.unchanged[0].first_seen_at, ts(100));
        assert_eq!(paths(&rec.deleted), vec!["b.py"]);
        assert_eq!(rec.deleted[0].deleted_at, Some(ts(2_000)));
        assert!(rec.restored.is_empty());

        let stats = rec.stats();
        assert_eq!((stats.new, stats.unchanged, stats.deleted), (1, 1, 1));
    }

    #[test]
    fn buckets_partition_union_of_paths() {
        let stored = vec![
            stored("keep.rs", Some("1"), FileStatus::Active),
            stored("mod.rs", Some("1"), FileStatus::Active),
            stored("gone.rs", Some("1"), FileStatus::Active),
            stored("tomb.rs", Some("1"), FileStatus::Deleted),
            stored("back.rs", Some("1"), FileStatus::Deleted),
            stored("nofp.rs", None, FileStatus::Active),
        ];
        let current = vec![
            src("keep.rs", Some("1")),
            src("mod.rs", Some("2")),
            src("back.rs", Some("1")),
            src("nofp.rs", None),
            src("fresh.rs", Some("9")),
            src("fresh.rs", Some("9")),
        ];
        let rec = reconcile(current, stored, MissingFingerprintPolicy::Reprocess, ts(5));

        let mut all: Vec<&str> = paths(&rec.work);
        all.extend(paths(&rec.unchanged));
        all.extend(paths(&rec.deleted));
        all.sort();
        assert_eq!(
            all,
            vec!["back.rs", "fresh.rs", "gone.rs", "keep.rs", "mod.rs", "nofp.rs", "tomb.rs"]
        );
        assert_eq!(rec.total(), 7);

        let status_of = |p: &str| rec.work.iter().find(|r| r.path == p).map(|r| r.status);
        assert_eq!(status_of("mod.rs"), Some(FileStatus::Modified));
        assert_eq!(status_of("back.rs"), Some(FileStatus::Restored));
        assert_eq!(status_of("nofp.rs"), Some(FileStatus::Unknown));
        assert_eq!(status_of("fresh.rs"), Some(FileStatus::New));
        assert!(rec.restored.contains("back.rs"));
        assert_eq!(rec.restored.len(), 1);
    }

    #[test]
    fn restored_path_is_reprocessed_and_keeps_first_seen() {
        let mut tomb = stored("x.py", Some("same"), FileStatus::Deleted);
        tomb.deleted_at = Some(ts(500));
        let rec = reconcile(
            vec![src("x.py", Some("same"))],
            vec![tomb],
            MissingFingerprintPolicy::Reprocess,
            ts(900),
        );
        assert_eq!(rec.work.len(), 1);
        assert_eq!(rec.work[0].status, FileStatus::Restored);
        assert_eq!(rec.work[0].first_seen_at, ts(100));

        let merged = merge(rec.work, rec.unchanged, rec.deleted);
        assert_eq!(merged[0].status, FileStatus::Active);
        assert_eq!(merged[0].deleted_at, None);
        assert_eq!(merged[0].first_seen_at, ts(100));
    }

    #[test]
    fn deleted_records_keep_earliest_deletion_time() {
        let mut tomb = stored("old.py", Some("1"), FileStatus::Deleted);
        tomb.deleted_at = Some(ts(300));
        tomb.updated_at = ts(300);
        let rec = reconcile(vec![], vec![tomb], MissingFingerprintPolicy::Reprocess, ts(999));
        assert_eq!(rec.deleted[0].deleted_at, Some(ts(300)));
        assert_eq!(rec.deleted[0].updated_at, ts(300));
    }

    #[test]
    fn one_sided_fingerprint_is_unknown() {
        let rec = reconcile(
            vec![src("a.go", Some("abc"))],
            vec![stored("a.go", None, FileStatus::Active)],
            MissingFingerprintPolicy::CompareMetadata,
            ts(1),
        );
        assert_eq!(rec.work[0].status, FileStatus::Unknown);
    }

    #[test]
    fn compare_metadata_policy_uses_size_and_time() {
        let stored_rec = stored("a.go", None, FileStatus::Active);

        let same = reconcile(
            vec![src("a.go", None)],
            vec![stored_rec.clone()],
            MissingFingerprintPolicy::CompareMetadata,
            ts(1),
        );
        assert_eq!(paths(&same.unchanged), vec!["a.go"]);

        let mut grown = src("a.go", None);
        grown.size = 11;
        let differs = reconcile(
            vec![grown],
            vec![stored_rec.clone()],
            MissingFingerprintPolicy::CompareMetadata,
            ts(1),
        );
        assert_eq!(differs.work[0].status, FileStatus::Unknown);

        let default_policy = reconcile(
            vec![src("a.go", None)],
            vec![stored_rec],
            MissingFingerprintPolicy::Reprocess,
            ts(1),
        );
        assert_eq!(default_policy.work[0].status, FileStatus::Unknown);
    }

    #[test]
    fn unchanged_keeps_enrichment_and_refreshes_listing_fields() {
        let mut existing = stored("a.py", Some("1"), FileStatus::Active);
        existing.search.summary = "does things".into();
        let mut current = src("a.py", Some("1"));
        current.last_change_summary = Some("rename helper".into());
        let rec = reconcile(
            vec![current],
            vec![existing],
            MissingFingerprintPolicy::Reprocess,
            ts(1),
        );
        let kept = &rec.unchanged[0];
        assert_eq!(kept.search.summary, "does things");
        assert_eq!(kept.last_change_summary.as_deref(), Some("rename helper"));
    }

    #[test]
    fn counts_over_merged_records() {
        let records = vec![
            stored("a", Some("1"), FileStatus::Active),
            stored("b", Some("1"), FileStatus::Deleted),
            stored("c", Some("1"), FileStatus::Unchanged),
        ];
        assert_eq!(
            file_counts(&records),
            FileCounts {
                active: 2,
                deleted: 1,
                total: 3
            }
        );
    }

    #[test]
    fn policy_parses() {
        assert_eq!(
            "compare-metadata".parse::<MissingFingerprintPolicy>().unwrap(),
            MissingFingerprintPolicy::CompareMetadata
        );
        assert!("sometimes".parse::<MissingFingerprintPolicy>().is_err());
    }
}
