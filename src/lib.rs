pub mod config;
pub mod domain;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod output;
pub mod resolve;
pub mod storage;
