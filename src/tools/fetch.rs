use crate::core::config::ExtractorConfig;
use crate::core::types::{
    CodeArtifact, ExtractionMetadata, FetchOutcome, FetchRequest, OutputFormat, RawPagePolicy,
    Transcript, Turn,
};
use crate::core::workdir;
use crate::features::operator::{VerificationError, VerificationGate};
use crate::scraping::browser_manager::{self, ChromiumDriver, PageDriver};
use crate::scraping::dom::{self, RawCodeNode, RawTurnNode};
use crate::scraping::offline;
use chrono::Local;
use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No browser found. Install Chrome, Chromium, or Brave. Set CHROME_EXECUTABLE if installed in a non-standard location.")]
    BrowserUnavailable,

    #[error("browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("saved page could not be read: {0}")]
    SavedPage(String),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("unexpected page data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// The operator backed out; not an internal failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            FetchError::Verification(VerificationError::Cancelled)
        )
    }
}

/// `true` when `url` parses and starts with the configured share prefix.
pub fn looks_like_share_link(url: &str, prefix: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && url.starts_with(prefix)
        }
        Err(_) => false,
    }
}

/// Launch a browser, run [`fetch_chat`] against it, and release it.
pub async fn fetch(
    req: &FetchRequest,
    cfg: &ExtractorConfig,
    gate: &dyn VerificationGate,
) -> Result<FetchOutcome, FetchError> {
    let exe = browser_manager::find_chrome_executable().ok_or(FetchError::BrowserUnavailable)?;
    let mut driver = ChromiumDriver::launch(&exe, cfg)
        .await
        .map_err(|e| FetchError::BrowserLaunchFailed(e.to_string()))?;
    fetch_chat(&mut driver, gate, cfg, req).await
}

/// Drive `driver` through one extraction pass and persist the intermediates.
///
/// The driver is closed before returning, whether or not extraction succeeded.
pub async fn fetch_chat(
    driver: &mut dyn PageDriver,
    gate: &dyn VerificationGate,
    cfg: &ExtractorConfig,
    req: &FetchRequest,
) -> Result<FetchOutcome, FetchError> {
    tokio::fs::create_dir_all(&req.work_dir).await?;
    info!("🌐 Fetching chat from: {}", req.url);

    let result = run_extraction(driver, gate, cfg, req).await;

    // Close errors are logged, never allowed to replace the extraction result.
    if let Err(e) = driver.close().await {
        warn!("Browser close error (non-fatal): {}", e);
    }

    let outcome = result?;

    if req.raw_page == RawPagePolicy::Transient {
        let raw = workdir::raw_page_path(&req.work_dir);
        match tokio::fs::remove_file(&raw).await {
            Ok(()) => info!("🧹 Cleaned up HTML file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", raw.display(), e),
        }
    }

    Ok(outcome)
}

async fn run_extraction(
    driver: &mut dyn PageDriver,
    gate: &dyn VerificationGate,
    cfg: &ExtractorConfig,
    req: &FetchRequest,
) -> Result<FetchOutcome, FetchError> {
    if let Err(e) = driver.navigate(&req.url, cfg.navigation_timeout()).await {
        warn!("⚠️  Navigation warning: {}", e);
    }

    gate.wait_for_clearance(&req.url).await?;
    discard_previous_run(&req.work_dir).await?;

    info!("📄 Extracting content...");
    if let Err(e) = driver.evaluate(dom::SCROLL_TO_BOTTOM_SCRIPT).await {
        warn!("Scroll to bottom failed (non-fatal): {}", e);
    }
    driver.pause(cfg.settle_delay()).await;

    if req.format == OutputFormat::Pdf {
        let bytes = driver
            .print_pdf()
            .await
            .map_err(|e| FetchError::Pdf(e.to_string()))?;
        let pdf_path = workdir::pdf_path(&req.work_dir);
        tokio::fs::write(&pdf_path, bytes).await?;
        info!("✅ PDF saved: {}", pdf_path.display());
    }

    let raw_turns: Vec<RawTurnNode> =
        evaluate_nodes(driver, &dom::turn_query_script(&cfg.selectors)).await?;
    let turns = dom::collect_turns(raw_turns, cfg.min_turn_chars(), dom::classify_role);

    if req.raw_page != RawPagePolicy::Skip {
        let html = driver
            .content()
            .await
            .map_err(|e| FetchError::Script(e.to_string()))?;
        tokio::fs::write(workdir::raw_page_path(&req.work_dir), html).await?;
    }

    let metadata = write_transcript(&req.work_dir, &req.url, &turns).await?;
    info!("💬 Extracted {} messages", metadata.message_count);

    info!("📦 Extracting artifacts...");
    let raw_code: Vec<RawCodeNode> =
        evaluate_nodes(driver, &dom::code_query_script(&cfg.selectors)).await?;
    let artifacts = dom::collect_artifacts(raw_code, cfg.min_artifact_chars());
    let artifact_count = write_artifacts(&req.work_dir, &artifacts).await?;
    info!("   Found {} code artifacts", artifact_count);

    Ok(FetchOutcome {
        metadata,
        artifact_count,
        work_dir: req.work_dir.clone(),
    })
}

/// Re-run extraction against a saved page instead of a live browser.
pub async fn extract_saved_page(
    html_path: &Path,
    url: &str,
    work_dir: &Path,
    cfg: &ExtractorConfig,
) -> Result<FetchOutcome, FetchError> {
    tokio::fs::create_dir_all(work_dir).await?;
    info!("📂 Extracting from saved page: {}", html_path.display());

    let html = tokio::fs::read_to_string(html_path).await?;
    let (raw_turns, raw_code) = offline::extract_raw_nodes(&html, &cfg.selectors)
        .map_err(|e| FetchError::SavedPage(e.to_string()))?;
    discard_previous_run(work_dir).await?;

    let turns = dom::collect_turns(raw_turns, cfg.min_turn_chars(), dom::classify_role);
    let metadata = write_transcript(work_dir, url, &turns).await?;

    let artifacts = dom::collect_artifacts(raw_code, cfg.min_artifact_chars());
    let artifact_count = write_artifacts(work_dir, &artifacts).await?;
    info!(
        "   Found {} messages and {} code artifacts",
        metadata.message_count, artifact_count
    );

    Ok(FetchOutcome {
        metadata,
        artifact_count,
        work_dir: work_dir.to_path_buf(),
    })
}

async fn discard_previous_run(work_dir: &Path) -> Result<(), FetchError> {
    let removed = workdir::clear_previous_run(work_dir).await?;
    if removed > 0 {
        info!("🧹 Removed {} files left by a previous run", removed);
    }
    Ok(())
}

async fn evaluate_nodes<T: DeserializeOwned>(
    driver: &mut dyn PageDriver,
    script: &str,
) -> Result<Vec<T>, FetchError> {
    let value = driver
        .evaluate(script)
        .await
        .map_err(|e| FetchError::Script(e.to_string()))?;
    if value.is_null() {
        warn!("Page query returned no data; the page layout may have changed");
        return Ok(Vec::new());
    }
    Ok(serde_json::from_value(value)?)
}

/// Write `conversation.json` and `conversation.md`.
async fn write_transcript(
    work_dir: &Path,
    url: &str,
    turns: &[Turn],
) -> Result<ExtractionMetadata, FetchError> {
    let now = Local::now();
    let metadata = ExtractionMetadata {
        url: url.to_string(),
        extracted_at: now.to_rfc3339(),
        message_count: turns.len(),
    };

    let transcript = Transcript {
        metadata: metadata.clone(),
        messages: turns.to_vec(),
    };
    tokio::fs::write(
        workdir::transcript_json_path(work_dir),
        serde_json::to_string_pretty(&transcript)?,
    )
    .await?;

    let markdown = render_transcript_markdown(
        &metadata,
        turns,
        &now.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    tokio::fs::write(workdir::transcript_md_path(work_dir), markdown).await?;

    Ok(metadata)
}

async fn write_artifacts(work_dir: &Path, artifacts: &[CodeArtifact]) -> Result<usize, FetchError> {
    for artifact in artifacts {
        let name = workdir::artifact_file_name(artifact.index, &artifact.language);
        tokio::fs::write(work_dir.join(name), &artifact.content).await?;
    }
    Ok(artifacts.len())
}

/// Per-turn Markdown: a short header block, then role header, content and a
/// separator for every turn.
pub fn render_transcript_markdown(
    metadata: &ExtractionMetadata,
    turns: &[Turn],
    date: &str,
) -> String {
    let mut lines: Vec<String> = vec![
        "# Claude Chat Export".to_string(),
        String::new(),
        format!("**Source**: {}", metadata.url),
        format!("**Extracted**: {} messages", metadata.message_count),
        format!("**Date**: {}", date),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    for turn in turns {
        lines.push(turn.role.markdown_header().to_string());
        lines.push(String::new());
        lines.push(turn.content.clone());
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Move the rendered `chat.pdf` out of `work_dir` to `output`.
///
/// Falls back to copy-then-remove when a rename crosses filesystems.
pub async fn relocate_pdf(work_dir: &Path, output: &Path) -> Result<(), FetchError> {
    let source = workdir::pdf_path(work_dir);
    if source == output {
        return Ok(());
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(&source, output).await.is_err() {
        tokio::fs::copy(&source, output).await?;
        tokio::fs::remove_file(&source).await?;
    }
    Ok(())
}
