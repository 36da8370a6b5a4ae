use anyhow::{Context, Result, bail};
use console::style;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::TrackdConfig;
use crate::core::consolidator::Consolidator;
use crate::core::store::{RetentionPolicy, SnapshotDraft, TrackStore};
use crate::core::terminal::{self, GuideSection};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AppendArgs {
    pub track: Option<String>,
    pub id: Option<String>,
    pub file: Option<PathBuf>,
    pub content: Option<String>,
    pub status: Option<String>,
}

async fn open_store(config: &TrackdConfig) -> Result<Arc<TrackStore>> {
    let data_dir = config.resolved_data_dir();
    let store = TrackStore::open(&data_dir, config.registry())
        .await
        .with_context(|| format!("failed to open track store at {}", data_dir.display()))?;
    Ok(Arc::new(store))
}

/// Inline or file content is stored as JSON when it parses, as a string otherwise.
fn parse_content(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.trim_end().to_string()))
}

async fn read_content(args: &AppendArgs) -> Result<Value> {
    match (&args.file, &args.content) {
        (Some(_), Some(_)) => bail!("use either --file or --content, not both"),
        (Some(path), None) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(parse_content(&raw))
        }
        (None, Some(text)) => Ok(parse_content(text)),
        (None, None) => bail!("--file or --content is required"),
    }
}

pub async fn run_append(config: &TrackdConfig, args: AppendArgs) -> Result<()> {
    let Some(track) = args.track.clone() else {
        bail!("--track is required");
    };
    let content = read_content(&args).await?;

    // Producers may embed their own fields, status and id in a JSON object.
    let mut draft = match &content {
        Value::Object(map) if map.contains_key("content") => {
            serde_json::from_value::<SnapshotDraft>(content.clone())
                .context("content looks like a snapshot draft but does not parse as one")?
        }
        _ => SnapshotDraft::new(content),
    };
    if let Some(id) = args.id {
        draft = draft.with_id(id);
    }
    if let Some(status) = args.status {
        draft = draft.with_status(status);
    }

    let store = open_store(config).await?;
    let snapshot = store.append(&track, draft).await?;
    terminal::print_success(&format!(
        "Stored snapshot {} in [{}]",
        style(&snapshot.id).cyan(),
        track
    ));
    Ok(())
}

pub async fn run_stats(config: &TrackdConfig) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats().await?;

    let mut section = GuideSection::new(&format!("Tracks ({})", store.root().display()));
    for s in &stats {
        let latest = s
            .latest_timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        section = section.status(
            &format!("{} ({})", s.track, s.kind.as_str()),
            &format!(
                "{} snapshot(s), latest {}, {}",
                s.count,
                latest,
                format_bytes(s.size_bytes)
            ),
        );
    }
    if stats.is_empty() {
        section = section.warn("No tracks are configured.");
    }
    section.print();
    println!();
    Ok(())
}

pub async fn run_cleanup(config: &TrackdConfig, policy: RetentionPolicy) -> Result<()> {
    let store = open_store(config).await?;
    let deleted = store.cleanup(policy).await?;
    let total: usize = deleted.values().sum();

    let mut section = GuideSection::new(&format!("Cleanup ({})", policy));
    for (track, n) in &deleted {
        section = section.status(track, &format!("{} removed", n));
    }
    section.print();
    println!();
    terminal::print_success(&format!("Removed {} snapshot(s)", total));
    Ok(())
}

pub async fn run_insights(config: &TrackdConfig, limit: usize, min_confidence: f64) -> Result<()> {
    let store = open_store(config).await?;
    let consolidator = Consolidator::new(store, config.consolidator.clone());
    let insights = consolidator.consolidate(min_confidence, limit).await?;

    if insights.is_empty() {
        terminal::print_info("No insights above the confidence threshold.");
        return Ok(());
    }

    let mut section = GuideSection::new("Insights");
    for (rank, o) in insights.iter().enumerate() {
        section = section.status(
            &format!("#{} {} {:.2}", rank + 1, o.track, o.score),
            &o.summary,
        );
    }
    section.print();
    println!();
    Ok(())
}

pub(crate) async fn load_config(path: Option<&Path>) -> Result<TrackdConfig> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(TrackdConfig::default_path);
    Ok(TrackdConfig::load(&path).await?)
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{} B", bytes)
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}
