pub mod config;
pub mod discovery;
pub mod resolver;
pub mod runner;
pub mod transcode;
