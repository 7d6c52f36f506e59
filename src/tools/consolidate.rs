use crate::core::types::ConsolidationSummary;
use crate::core::workdir::{self, TRANSCRIPT_MD_FILE};
use chrono::Local;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error("{} not found in {}", TRANSCRIPT_MD_FILE, .0.display())]
    NotFound(PathBuf),

    #[error("duplicate artifact index {index}: {first} and {second}")]
    DuplicateArtifact {
        index: usize,
        first: String,
        second: String,
    },

    #[error("output {} would overwrite an intermediate file", .0.display())]
    OutputIsIntermediate(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One artifact file read back from the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    /// Fence label derived from the file extension.
    pub label: String,
    pub content: String,
}

/// Header values echoed from `conversation.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub source: String,
    pub messages: String,
}

impl Default for HeaderInfo {
    fn default() -> Self {
        Self {
            source: UNKNOWN.to_string(),
            messages: UNKNOWN.to_string(),
        }
    }
}

/// Merge the intermediates in `work_dir` into `output_file`.
///
/// Unless `keep_artifacts` is set, the artifact files and `conversation.md`
/// are removed after the output is written. `conversation.json` always stays.
pub async fn consolidate(
    work_dir: &Path,
    output_file: &Path,
    keep_artifacts: bool,
) -> Result<ConsolidationSummary, ConsolidateError> {
    info!("📝 Consolidating to: {}", output_file.display());

    let conversation_path = workdir::transcript_md_path(work_dir);
    let conversation = match tokio::fs::read_to_string(&conversation_path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConsolidateError::NotFound(work_dir.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    if workdir::is_intermediate_path(work_dir, output_file) {
        return Err(ConsolidateError::OutputIsIntermediate(
            output_file.to_path_buf(),
        ));
    }

    let header = read_header_info(work_dir).await;
    let artifacts = discover_artifacts(work_dir).await?;

    let exported_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let document = render_consolidated(&header, &conversation, &artifacts, &exported_at);
    tokio::fs::write(output_file, &document).await?;

    let output_bytes = tokio::fs::metadata(output_file)
        .await
        .map(|m| m.len())
        .unwrap_or(document.len() as u64);

    info!("✅ Consolidated markdown created:");
    info!("   - Size: {:.1} KB", output_bytes as f64 / 1024.0);
    info!("   - Conversation: {} chars", conversation.chars().count());
    info!("   - Artifacts: {}", artifacts.len());

    let mut summary = ConsolidationSummary {
        output_bytes,
        conversation_chars: conversation.chars().count(),
        artifact_count: artifacts.len(),
        removed_files: 0,
    };

    if !keep_artifacts {
        for artifact in artifacts.values() {
            tokio::fs::remove_file(&artifact.path).await?;
            summary.removed_files += 1;
        }
        match tokio::fs::remove_file(&conversation_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("   Cleaned up {} artifact files", summary.removed_files);
    }

    Ok(summary)
}

/// Source URL and message count from `conversation.json`; placeholders when
/// the file is missing or unreadable.
pub async fn read_header_info(work_dir: &Path) -> HeaderInfo {
    let path = workdir::transcript_json_path(work_dir);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(_) => return HeaderInfo::default(),
    };
    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("{} parse error: {}; using placeholders", path.display(), e);
            return HeaderInfo::default();
        }
    };

    let metadata = value.get("metadata");
    let source = metadata
        .and_then(|m| m.get("url"))
        .and_then(|u| u.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string());
    let messages = metadata
        .and_then(|m| m.get("message_count"))
        .map(|n| match n {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| UNKNOWN.to_string());

    HeaderInfo { source, messages }
}

/// Artifact files in `work_dir`, keyed and ordered by their numeric index.
///
/// Two files claiming the same index are rejected rather than one silently
/// replacing the other.
pub async fn discover_artifacts(
    work_dir: &Path,
) -> Result<BTreeMap<usize, ArtifactFile>, ConsolidateError> {
    let mut found: BTreeMap<usize, ArtifactFile> = BTreeMap::new();

    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some((index, ext)) = name.to_str().and_then(workdir::parse_artifact_file_name) else {
            continue;
        };

        let path = entry.path();
        if let Some(existing) = found.get(&index) {
            let mut pair = [existing.path.clone(), path];
            pair.sort();
            return Err(ConsolidateError::DuplicateArtifact {
                index,
                first: pair[0].display().to_string(),
                second: pair[1].display().to_string(),
            });
        }

        let content = tokio::fs::read_to_string(&path).await?;
        found.insert(
            index,
            ArtifactFile {
                path,
                label: workdir::label_for_extension(&ext),
                content,
            },
        );
    }

    Ok(found)
}

/// Assemble the consolidated document. Only `exported_at` varies between runs
/// over the same inputs.
pub fn render_consolidated(
    header: &HeaderInfo,
    conversation: &str,
    artifacts: &BTreeMap<usize, ArtifactFile>,
    exported_at: &str,
) -> String {
    let mut lines: Vec<String> = vec![
        "# Claude Chat Export - Consolidated".to_string(),
        String::new(),
        format!("**Exported**: {}", exported_at),
        format!("**Source**: {}", header.source),
        format!("**Messages**: {}", header.messages),
        format!("**Artifacts**: {}", artifacts.len()),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    if !artifacts.is_empty() {
        lines.push("## 📦 Code Artifacts".to_string());
        lines.push(String::new());
        for index in artifacts.keys() {
            lines.push(format!("- [Artifact {index}](#artifact-{index})"));
        }
        lines.extend([String::new(), "---".to_string(), String::new()]);
    }

    lines.push("## 💬 Conversation".to_string());
    lines.push(String::new());
    lines.push(conversation.to_string());
    lines.push(String::new());

    if !artifacts.is_empty() {
        lines.extend([
            String::new(),
            "---".to_string(),
            String::new(),
            "## 📝 Code Artifacts - Full Content".to_string(),
            String::new(),
        ]);
        for (index, artifact) in artifacts {
            lines.push(format!("### Artifact {index}"));
            lines.push(String::new());
            lines.push(format!("```{}", artifact.label));
            lines.push(artifact.content.clone());
            lines.push("```".to_string());
            lines.push(String::new());
        }
    }

    lines.extend([
        "---".to_string(),
        String::new(),
        "*This document was automatically generated from a Claude chat export.*".to_string(),
        "*Ready to use as context in your next Claude conversation.*".to_string(),
        String::new(),
    ]);

    lines.join("\n")
}
