pub mod changes;
pub mod common;
pub mod config;
pub mod resource;
pub mod sync;
