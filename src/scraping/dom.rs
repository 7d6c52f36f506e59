//! DOM extraction for shared conversation pages.
//!
//! The in-page scripts only *collect* raw element data. Role classification,
//! language detection and the minimum-length noise filters run in Rust so the
//! same policy applies to live pages and to saved HTML (see `offline.rs`).

use crate::core::config::SelectorConfig;
use crate::core::types::{CodeArtifact, Role, Turn};
use serde::Deserialize;

pub const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

pub const PAGE_HTML_SCRIPT: &str = "document.documentElement.outerHTML";

/// Fallback language token when a code block carries no usable class hint.
pub const DEFAULT_LANGUAGE: &str = "text";

/// One element matched by the turn selector, as reported by the page.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawTurnNode {
    pub index: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub has_user_marker: bool,
}

/// One element matched by the code selector.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawCodeNode {
    pub index: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub class_name: String,
}

/// Signature of a role policy; swap it when the share page markup drifts.
pub type RoleClassifier = fn(&RawTurnNode) -> Role;

/// Current markup policy: user messages carry `user` in their class list or
/// contain the user-message marker element. Everything else is the assistant.
pub fn classify_role(node: &RawTurnNode) -> Role {
    if node.has_user_marker || node.class_name.contains("user") {
        Role::User
    } else {
        Role::Assistant
    }
}

/// Reads `language-<token>` (or `lang-<token>`) from a class attribute.
pub fn language_from_class(class_attr: &str) -> String {
    class_attr
        .split_whitespace()
        .find_map(|c| {
            c.strip_prefix("language-")
                .or_else(|| c.strip_prefix("lang-"))
        })
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

/// Turn raw nodes into transcript turns, dropping anything whose trimmed text
/// is `min_chars` characters or shorter.
pub fn collect_turns(
    nodes: Vec<RawTurnNode>,
    min_chars: usize,
    classify: RoleClassifier,
) -> Vec<Turn> {
    nodes
        .into_iter()
        .filter_map(|node| {
            let content = node.text.trim();
            if content.chars().count() <= min_chars {
                return None;
            }
            Some(Turn {
                index: node.index,
                role: classify(&node),
                content: content.to_string(),
            })
        })
        .collect()
}

/// Code blocks are kept verbatim (whitespace matters), filtered on their full length.
pub fn collect_artifacts(nodes: Vec<RawCodeNode>, min_chars: usize) -> Vec<CodeArtifact> {
    nodes
        .into_iter()
        .filter(|node| node.text.chars().count() > min_chars)
        .map(|node| CodeArtifact {
            index: node.index,
            language: language_from_class(&node.class_name),
            content: node.text,
        })
        .collect()
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script returning `RawTurnNode[]` for every element matching the turn selector.
pub fn turn_query_script(selectors: &SelectorConfig) -> String {
    format!(
        r#"(() => {{
            const turnSel = {turn};
            const userSel = {user};
            return Array.from(document.querySelectorAll(turnSel)).map((el, i) => {{
                let marker = false;
                try {{
                    marker = el.matches(userSel) || !!el.querySelector(userSel);
                }} catch (_) {{}}
                const cls = typeof el.className === 'string'
                    ? el.className
                    : (el.getAttribute('class') || '');
                return {{
                    index: i,
                    text: el.innerText || el.textContent || '',
                    className: cls,
                    hasUserMarker: marker
                }};
            }});
        }})()"#,
        turn = js_string(&selectors.turn),
        user = js_string(&selectors.user_marker),
    )
}

/// Script returning `RawCodeNode[]` for every element matching the code selector.
pub fn code_query_script(selectors: &SelectorConfig) -> String {
    format!(
        r#"(() => {{
            const codeSel = {code};
            return Array.from(document.querySelectorAll(codeSel)).map((el, i) => ({{
                index: i,
                text: el.textContent || '',
                className: el.getAttribute('class') || ''
            }}));
        }})()"#,
        code = js_string(&selectors.code),
    )
}
