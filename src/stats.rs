//! Repository sync status overview.
//!
//! Used by `reposync status <owner/repo>`: shows the repository record, the
//! last run's counts, file totals by status, and the most recent metrics
//! rows.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

use repo_sync_core::models::{repository_id, SyncStats};
use repo_sync_core::store::SyncStateStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

const RECENT_METRICS: usize = 5;

/// Run the status command: read the store and print a summary.
pub async fn run_status(config: &Config, repo: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let repo_id = repository_id(repo);

    let record = match store.get_repository(&repo_id).await? {
        Some(r) => r,
        None => {
            store.pool().close().await;
            bail!("repository not synced yet: {}", repo);
        }
    };

    let status_rows = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM files WHERE repo_id = ? GROUP BY status ORDER BY status",
    )
    .bind(&repo_id)
    .fetch_all(store.pool())
    .await?;
    let metrics = store.list_metrics(&repo_id, RECENT_METRICS).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("{}", record.metadata.full_name);
    println!("{}", "=".repeat(record.metadata.full_name.len().max(8)));
    println!();
    println!("  Id:            {}", record.id);
    if let Some(desc) = &record.metadata.description {
        println!("  Description:   {}", desc);
    }
    if let Some(branch) = &record.metadata.default_branch {
        println!("  Branch:        {}", branch);
    }
    println!("  Status:        {}", record.sync_status);
    if let Some(p) = record.progress {
        println!("  Progress:      {} / {}", p.processed, p.total);
    }
    if let Some(err) = &record.last_error {
        println!("  Last error:    {}", err);
    }
    println!("  Last sync:     {}", format_opt_relative(record.last_synced_at));
    println!("  First indexed: {}", format_opt_relative(record.first_indexed_at));
    println!(
        "  Database:      {} ({})",
        config.db.path.display(),
        format_bytes(db_size)
    );

    if let Some(counts) = record.file_counts {
        println!();
        println!(
            "  Files:         {} active, {} deleted, {} total",
            counts.active, counts.deleted, counts.total
        );
    }
    if !status_rows.is_empty() {
        println!("  By status:");
        for row in &status_rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            println!("    {:<12} {:>8}", status, n);
        }
    }

    if let Some(stats) = record.last_sync_stats {
        println!();
        println!("  Last run:      {}", format_stats(&stats));
    }

    if !metrics.is_empty() {
        println!();
        println!("  Recent runs:");
        println!(
            "  {:<18} {:>5} {:>5} {:>5} {:>5} {:>5} {:>6}   {}",
            "WHEN", "NEW", "MOD", "SAME", "DEL", "FAIL", "TOTAL", "ID"
        );
        println!("  {}", "-".repeat(76));
        for m in &metrics {
            println!(
                "  {:<18} {:>5} {:>5} {:>5} {:>5} {:>5} {:>6}   {}",
                format_ts_relative(m.recorded_at),
                m.stats.new,
                m.stats.modified,
                m.stats.unchanged,
                m.stats.deleted,
                m.stats.failed,
                m.totals.total,
                m.id
            );
        }
    }

    println!();
    store.pool().close().await;
    Ok(())
}

fn format_stats(s: &SyncStats) -> String {
    format!(
        "{} new, {} modified, {} unchanged, {} unknown, {} restored, {} deleted, {} failed, {} skipped",
        s.new, s.modified, s.unchanged, s.unknown, s.restored, s.deleted, s.failed, s.skipped
    )
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_opt_relative(ts: Option<DateTime<Utc>>) -> String {
    ts.map(format_ts_relative)
        .unwrap_or_else(|| "never".to_string())
}

/// Format a timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = Utc::now();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - Duration::minutes(1)), "1 min ago");
        assert_eq!(format_ts_relative(now - Duration::hours(3)), "3 hours ago");
        assert_eq!(format_opt_relative(None), "never");
    }
}
