pub mod add;
pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod config;
pub mod delete;
pub mod edit;
pub mod export;
pub mod favorite;
pub mod import;
pub mod list;
pub mod search;
pub mod sync;
pub mod use_command;
