pub mod app;
pub mod blast;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod pipeline;
pub mod references;
pub mod report;
