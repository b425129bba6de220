pub mod categorize;
pub mod clock;
pub mod config;
pub mod costs;
pub mod feed;
pub mod models;
pub mod server;
pub mod storage;
pub mod sync;
