pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fs_util;
pub mod normalize;
pub mod optimize;
pub mod output;
pub mod resolver;
pub mod store;
pub mod verify;
pub mod wiki;
