#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod catalog;
pub mod comments;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod download;
pub mod identity;
pub mod logging;
pub mod preview;
pub mod reactions;
pub mod remote;
pub mod session;
pub mod share;
pub mod storage;
pub mod ui;
pub mod viewer;
pub mod views;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
