pub mod consolidate;
pub mod fetch;
