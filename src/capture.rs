// src/capture.rs
//
// Recorded evaluation cycles for offline replay. One JSON file per cycle:
// the raw detection rows read from the detections store plus, optionally,
// one raw model output for a frame grabbed during the same cycle.

use crate::decoder::ModelOutput;
use crate::types::RawDetection;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleCapture {
    pub junction_id: Option<String>,
    pub frame: Option<FrameCapture>,
    pub detections: Vec<RawDetection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameCapture {
    pub width: usize,
    pub height: usize,
    pub output: ModelOutput,
}

/// All `*.json` files under `dir`, sorted by path so replays are repeatable.
pub fn find_capture_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        anyhow::bail!("Capture directory {} does not exist", dir.display());
    }

    let mut captures: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();
    captures.sort();

    info!("Found {} capture file(s) in {}", captures.len(), dir.display());
    Ok(captures)
}

pub fn load_capture(path: &Path) -> Result<CycleCapture> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read capture {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse capture {}", path.display()))
}
