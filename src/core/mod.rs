//! Configuration, errors and path handling shared by every module.

pub mod config;
pub mod error;
pub mod paths;
