pub mod config;
pub mod consolidator;
pub mod lifecycle;
pub mod store;
pub mod supervisor;
pub mod terminal;
