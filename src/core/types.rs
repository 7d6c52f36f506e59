use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Markdown header used for this role in the per-turn transcript.
    pub fn markdown_header(self) -> &'static str {
        match self {
            Role::User => "### 👤 **User**",
            Role::Assistant => "### 🤖 **Claude**",
        }
    }
}

/// One extracted conversational message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Position of the source element in DOM order (skipped elements keep their slot).
    pub index: usize,
    pub role: Role,
    pub content: String,
}

/// One extracted code block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub index: usize,
    pub content: String,
    /// Short language token, e.g. `python`, `rust`, `text`.
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub url: String,
    pub extracted_at: String,
    pub message_count: usize,
}

/// On-disk shape of `conversation.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub metadata: ExtractionMetadata,
    pub messages: Vec<Turn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Pdf,
}

impl OutputFormat {
    /// Default output path when `--output` is omitted.
    pub fn default_output(self) -> PathBuf {
        match self {
            OutputFormat::Markdown => PathBuf::from("consolidated_chat.md"),
            OutputFormat::Pdf => PathBuf::from("chat.pdf"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// What happens to the raw page markup captured during a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawPagePolicy {
    /// Never written.
    Skip,
    /// Written, then removed once extraction is done.
    #[default]
    Transient,
    /// Written and left in the working directory.
    Keep,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub work_dir: PathBuf,
    pub format: OutputFormat,
    pub raw_page: RawPagePolicy,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub metadata: ExtractionMetadata,
    pub artifact_count: usize,
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidationSummary {
    pub output_bytes: u64,
    pub conversation_chars: usize,
    pub artifact_count: usize,
    pub removed_files: usize,
}
