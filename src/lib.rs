pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod inspect;
pub mod output;
pub mod paths;
pub mod rename;
pub mod schema;
pub mod store;
pub mod sync;
pub mod tui;
pub mod validate;
