pub mod core;
pub mod features;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::{load_config, ExtractorConfig};

pub use features::operator;
pub use scraping::browser_manager;
pub use tools::consolidate::{consolidate, ConsolidateError};
pub use tools::fetch::{extract_saved_page, fetch, fetch_chat, FetchError};
