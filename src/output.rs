use crate::collector::CollectionReport;
use crate::error::Result;
use crate::scoring::CollectionAnalysis;
use crate::trends::TrendReport;
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct CollectionSummary<'a> {
    generated_at: String,
    total_items: usize,
    restarts: u32,
    aborted: bool,
    data: &'a crate::models::CollectedData,
    analysis: &'a CollectionAnalysis,
}

#[derive(Serialize)]
struct TrendSummary<'a> {
    generated_at: String,
    #[serde(flatten)]
    report: &'a TrendReport,
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn generated_at() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// `summary_<modules>_<timestamp>.json`, with `empty` when nothing ran.
pub fn collection_file_name(report: &CollectionReport, stamp: &str) -> String {
    let modules = report.data.keys().cloned().collect::<Vec<_>>().join("_");
    let modules = if modules.is_empty() { "empty".to_string() } else { modules };
    format!("summary_{}_{}.json", modules, stamp)
}

/// Persist collected data and its analysis under `dir`.
pub fn write_collection(dir: &Path, report: &CollectionReport, analysis: &CollectionAnalysis) -> Result<PathBuf> {
    let path = dir.join(collection_file_name(report, &timestamp()));
    let summary = CollectionSummary {
        generated_at: generated_at(),
        total_items: report.total_items(),
        restarts: report.restarts,
        aborted: report.aborted,
        data: &report.data,
        analysis,
    };
    write_json(&path, &summary)?;
    tracing::info!(path = %path.display(), "Saved collection summary");
    Ok(path)
}

/// A directory target gets a timestamped file name; anything else is used as is.
pub fn resolve_trend_path(target: &Path) -> PathBuf {
    if target.is_dir() {
        target.join(format!("trend_report_{}.json", timestamp()))
    } else {
        target.to_path_buf()
    }
}

pub fn write_trends(target: &Path, report: &TrendReport) -> Result<PathBuf> {
    let path = resolve_trend_path(target);
    write_json(
        &path,
        &TrendSummary {
            generated_at: generated_at(),
            report,
        },
    )?;
    tracing::info!(path = %path.display(), "Saved trend report");
    Ok(path)
}
