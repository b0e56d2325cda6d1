pub mod app;
pub mod bulk;
pub mod config;
pub mod domain;
pub mod download_list;
pub mod error;
pub mod fetcher;
pub mod fs_util;
pub mod output;
pub mod remote;
pub mod store;
pub mod tui;
