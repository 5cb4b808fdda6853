// src/badge.rs

use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use tracing::{info, instrument};

use crate::archive::{list_dated_files, naming};
use crate::config::GistTarget;
use crate::error::BadgeError;

/// A shields.io "endpoint" badge document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDocument {
    pub schema_version: u8,
    pub label: String,
    pub message: String,
    pub color: String,
}

impl BadgeDocument {
    pub fn new(label: &str, message: &str, color: &str) -> Self {
        Self {
            schema_version: 1,
            label: label.to_string(),
            message: message.to_string(),
            color: color.to_string(),
        }
    }
}

/// The `yyyy-mm-dd` part of the last DatedFile name in `by_date_dir`, taken
/// at fixed offsets after the `iccas_` prefix.
pub fn latest_date_label(by_date_dir: &Path) -> Result<String, BadgeError> {
    let files = list_dated_files(by_date_dir)?;
    let name = files
        .last()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .ok_or_else(|| BadgeError::NoDatedFiles(by_date_dir.to_path_buf()))?;
    // Listing only returns names that parse as `iccas_<yyyy-mm-dd>.csv`.
    let start = naming::DATED_PREFIX.len();
    Ok(name[start..start + 10].to_string())
}

/// Replaces the badge file in the gist with `doc`.
#[instrument(level = "info", skip(client, target, doc), fields(gist = %target.gist_id, message = %doc.message))]
pub async fn publish(
    client: &Client,
    target: &GistTarget,
    filename: &str,
    doc: &BadgeDocument,
) -> Result<(), BadgeError> {
    let url = target
        .api_base
        .join(&format!("gists/{}", target.gist_id))
        .map_err(|e| BadgeError::InvalidTarget(e.to_string()))?;
    let content = serde_json::to_string(doc)?;
    let mut files = serde_json::Map::new();
    files.insert(filename.to_string(), json!({ "content": content }));
    let body = json!({ "files": files });

    client
        .patch(url)
        .bearer_auth(&target.token)
        .header("Accept", "application/vnd.github+json")
        .json(&body)
        .send()
        .await?
        .error_for_status()?;
    info!("badge published");
    Ok(())
}
