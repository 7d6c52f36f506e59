use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ExtractorConfig: file-based config loader (chat-extractor.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "CHAT_EXTRACTOR_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_NAV_TIMEOUT_SECS: &str = "CHAT_EXTRACTOR_NAV_TIMEOUT_SECS";
pub const ENV_SETTLE_MS: &str = "CHAT_EXTRACTOR_SETTLE_MS";
pub const ENV_HEADLESS: &str = "CHAT_EXTRACTOR_HEADLESS";
pub const ENV_AUTO_CONTINUE: &str = "CHAT_EXTRACTOR_AUTO_CONTINUE";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_SHARE_PREFIX: &str = "https://claude.ai/share/";

/// CSS selectors that couple extraction to the share page's markup.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SelectorConfig {
    /// Every rendered message carries this marker.
    pub turn: String,
    /// Present inside (or on) user-authored messages only.
    pub user_marker: String,
    /// Preformatted code blocks.
    pub code: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            turn: "[data-test-render-count]".to_string(),
            user_marker: ".font-user-message".to_string(),
            code: "pre code".to_string(),
        }
    }
}

/// Top-level config loaded from `chat-extractor.json`.
///
/// Every field is optional in the file; [`ExtractorConfig`] accessors resolve
/// JSON field → env var → built-in default.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct ExtractorConfig {
    pub user_agent: Option<String>,
    pub navigation_timeout_secs: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub headless: Option<bool>,
    pub min_turn_chars: Option<usize>,
    pub min_artifact_chars: Option<usize>,
    pub share_url_prefix: Option<String>,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl ExtractorConfig {
    pub fn user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    /// Navigation timeout: JSON field → `CHAT_EXTRACTOR_NAV_TIMEOUT_SECS` → 60s.
    pub fn navigation_timeout(&self) -> Duration {
        let secs = self
            .navigation_timeout_secs
            .or_else(|| env_parse(ENV_NAV_TIMEOUT_SECS))
            .unwrap_or(60);
        Duration::from_secs(secs)
    }

    /// Delay after the scroll-to-bottom: JSON field → `CHAT_EXTRACTOR_SETTLE_MS` → 2000ms.
    pub fn settle_delay(&self) -> Duration {
        let ms = self
            .settle_delay_ms
            .or_else(|| env_parse(ENV_SETTLE_MS))
            .unwrap_or(2000);
        Duration::from_millis(ms)
    }

    /// Headed by default so the operator can solve verification challenges.
    pub fn headless(&self) -> bool {
        self.headless
            .or_else(|| std::env::var(ENV_HEADLESS).ok().map(|v| env_truthy(&v)))
            .unwrap_or(false)
    }

    pub fn min_turn_chars(&self) -> usize {
        self.min_turn_chars.unwrap_or(10)
    }

    pub fn min_artifact_chars(&self) -> usize {
        self.min_artifact_chars.unwrap_or(50)
    }

    pub fn share_url_prefix(&self) -> &str {
        self.share_url_prefix
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_SHARE_PREFIX)
    }
}

/// Load `chat-extractor.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `CHAT_EXTRACTOR_CONFIG` env var path
/// 2. `./chat-extractor.json`
/// 3. `~/.chat-extractor/config.json`
///
/// Missing file → `ExtractorConfig::default()`.
/// Parse error → log a warning, return `ExtractorConfig::default()`.
pub fn load_config() -> ExtractorConfig {
    for path in config_candidates() {
        match std::fs::read_to_string(&path) {
            Ok(contents) => return parse_config(&path, &contents),
            Err(_) => continue,
        }
    }
    ExtractorConfig::default()
}

fn config_candidates() -> Vec<PathBuf> {
    let mut v = vec![PathBuf::from("chat-extractor.json")];
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".chat-extractor").join("config.json"));
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        v.insert(0, PathBuf::from(env_path));
    }
    v
}

fn parse_config(path: &Path, contents: &str) -> ExtractorConfig {
    match serde_json::from_str::<ExtractorConfig>(contents) {
        Ok(cfg) => {
            tracing::info!("chat-extractor config loaded from {}", path.display());
            cfg
        }
        Err(e) => {
            tracing::warn!(
                "chat-extractor config parse error at {}: {}; using defaults",
                path.display(),
                e
            );
            ExtractorConfig::default()
        }
    }
}

/// Optional override for the Chromium-family browser executable.
///
/// Only returns a value when `CHROME_EXECUTABLE` points at an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() || !Path::new(p).exists() {
        return None;
    }
    Some(p.to_string())
}

/// `CHAT_EXTRACTOR_AUTO_CONTINUE=1` skips the human verification pause.
pub fn auto_continue_enabled() -> bool {
    std::env::var(ENV_AUTO_CONTINUE)
        .map(|v| env_truthy(&v))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_falls_back_to_defaults() {
        let cfg = parse_config(Path::new("inline.json"), "{}");
        assert_eq!(cfg.user_agent(), DEFAULT_USER_AGENT);
        assert_eq!(cfg.min_turn_chars(), 10);
        assert_eq!(cfg.min_artifact_chars(), 50);
        assert_eq!(cfg.share_url_prefix(), DEFAULT_SHARE_PREFIX);
        assert_eq!(cfg.selectors, SelectorConfig::default());
    }

    #[test]
    fn partial_selectors_keep_remaining_defaults() {
        let cfg = parse_config(
            Path::new("inline.json"),
            r#"{"selectors": {"code": "pre > code.hljs"}, "min_artifact_chars": 20}"#,
        );
        assert_eq!(cfg.selectors.code, "pre > code.hljs");
        assert_eq!(cfg.selectors.turn, "[data-test-render-count]");
        assert_eq!(cfg.min_artifact_chars(), 20);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let cfg = parse_config(Path::new("inline.json"), "{ not json");
        assert!(cfg.user_agent.is_none());
        assert_eq!(cfg.selectors, SelectorConfig::default());
    }

    #[test]
    fn blank_user_agent_is_ignored() {
        let cfg = ExtractorConfig {
            user_agent: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(cfg.user_agent(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn explicit_timeouts_win_over_env() {
        let cfg = ExtractorConfig {
            navigation_timeout_secs: Some(5),
            settle_delay_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(cfg.navigation_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.settle_delay(), Duration::ZERO);
    }

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "YES", " on "] {
            assert!(env_truthy(v), "{v} should be truthy");
        }
        for v in ["0", "false", "", "nope"] {
            assert!(!env_truthy(v), "{v} should be falsy");
        }
    }
}
