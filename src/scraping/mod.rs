pub mod browser_manager;
pub mod dom;
pub mod offline;
