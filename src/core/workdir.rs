//! Working-directory layout shared by the fetch and consolidate stages.
//!
//! Everything here is intermediate state: the fetch stage writes it, the
//! consolidate stage reads it back and (by default) removes it.

use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const RAW_PAGE_FILE: &str = "chat_complete.html";
pub const TRANSCRIPT_JSON_FILE: &str = "conversation.json";
pub const TRANSCRIPT_MD_FILE: &str = "conversation.md";
pub const PDF_FILE: &str = "chat.pdf";

const ARTIFACT_PREFIX: &str = "artifact_code_";

/// Language token → file extension. Unlisted tokens are used verbatim.
const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("python", "py"),
    ("javascript", "js"),
    ("typescript", "ts"),
    ("rust", "rs"),
    ("bash", "sh"),
    ("shell", "sh"),
    ("sh", "sh"),
    ("text", "txt"),
    ("plaintext", "txt"),
    ("markdown", "md"),
    ("yaml", "yml"),
    ("c++", "cpp"),
    ("csharp", "cs"),
    ("ruby", "rb"),
    ("kotlin", "kt"),
];

/// File extension → fence label. Unlisted extensions are used verbatim.
const EXTENSION_LABELS: &[(&str, &str)] = &[
    ("py", "python"),
    ("rs", "rust"),
    ("sh", "bash"),
    ("txt", "text"),
    ("md", "markdown"),
    ("yml", "yaml"),
    ("rb", "ruby"),
    ("kt", "kotlin"),
    ("cs", "csharp"),
];

pub fn raw_page_path(work_dir: &Path) -> PathBuf {
    work_dir.join(RAW_PAGE_FILE)
}

pub fn transcript_json_path(work_dir: &Path) -> PathBuf {
    work_dir.join(TRANSCRIPT_JSON_FILE)
}

pub fn transcript_md_path(work_dir: &Path) -> PathBuf {
    work_dir.join(TRANSCRIPT_MD_FILE)
}

pub fn pdf_path(work_dir: &Path) -> PathBuf {
    work_dir.join(PDF_FILE)
}

/// Extension for an artifact written in `language`.
pub fn extension_for_language(language: &str) -> String {
    let lang = language.trim().to_ascii_lowercase();
    if let Some((_, ext)) = LANGUAGE_EXTENSIONS.iter().find(|(l, _)| *l == lang) {
        return (*ext).to_string();
    }
    let cleaned: String = lang
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "txt".to_string()
    } else {
        cleaned
    }
}

/// Fence label for an artifact file with extension `ext`.
pub fn label_for_extension(ext: &str) -> String {
    let ext = ext.to_ascii_lowercase();
    EXTENSION_LABELS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or(ext)
}

pub fn artifact_file_name(index: usize, language: &str) -> String {
    format!(
        "{}{}.{}",
        ARTIFACT_PREFIX,
        index,
        extension_for_language(language)
    )
}

fn artifact_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^artifact_code_(\d+)\.([A-Za-z0-9_+\-]+)$").expect("valid artifact pattern")
    })
}

/// Parse `artifact_code_<index>.<ext>` into `(index, ext)`.
pub fn parse_artifact_file_name(name: &str) -> Option<(usize, String)> {
    let caps = artifact_name_regex().captures(name)?;
    let index = caps.get(1)?.as_str().parse().ok()?;
    Some((index, caps.get(2)?.as_str().to_string()))
}

/// `true` when `path` names one of the files a run keeps in `work_dir`.
///
/// Writing a final output over any of these would have it read back or
/// deleted as an intermediate.
pub fn is_intermediate_path(work_dir: &Path, path: &Path) -> bool {
    let (Ok(dir), Ok(path)) = (std::path::absolute(work_dir), std::path::absolute(path)) else {
        return false;
    };
    if path.parent() != Some(dir.as_path()) {
        return false;
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => {
            name == TRANSCRIPT_MD_FILE
                || name == TRANSCRIPT_JSON_FILE
                || name == RAW_PAGE_FILE
                || parse_artifact_file_name(name).is_some()
        }
        None => false,
    }
}

/// Remove the transcript, PDF and artifact files a previous run left in
/// `work_dir`. The saved page stays: it may be the input being re-extracted.
///
/// Returns the number of files removed.
pub async fn clear_previous_run(work_dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for path in [
        transcript_json_path(work_dir),
        transcript_md_path(work_dir),
        pdf_path(work_dir),
    ] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_str().and_then(parse_artifact_file_name).is_some() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
