//! Offline extraction from saved page markup.
//!
//! Mirrors the in-page scripts from `dom.rs` with `scraper` selectors so a
//! kept `chat_complete.html` can be re-extracted without a browser.

use super::dom::{RawCodeNode, RawTurnNode};
use crate::core::config::SelectorConfig;
use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {:?}: {}", css, e))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// Raw turn and code nodes found in `html`, in document order.
pub fn extract_raw_nodes(
    html: &str,
    selectors: &SelectorConfig,
) -> Result<(Vec<RawTurnNode>, Vec<RawCodeNode>)> {
    let turn_sel = parse_selector(&selectors.turn)?;
    let user_sel = parse_selector(&selectors.user_marker)?;
    let code_sel = parse_selector(&selectors.code)?;

    let document = Html::parse_document(html);

    let turns = document
        .select(&turn_sel)
        .enumerate()
        .map(|(index, el)| RawTurnNode {
            index,
            text: element_text(&el),
            class_name: el.value().attr("class").unwrap_or_default().to_string(),
            has_user_marker: user_sel.matches(&el) || el.select(&user_sel).next().is_some(),
        })
        .collect();

    let code = document
        .select(&code_sel)
        .enumerate()
        .map(|(index, el)| RawCodeNode {
            index,
            text: element_text(&el),
            class_name: el.value().attr("class").unwrap_or_default().to_string(),
        })
        .collect();

    Ok((turns, code))
}
