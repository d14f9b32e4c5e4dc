//! # md2pptx Common Library
//!
//! Shared code for the md2pptx service crates:
//! - Error type and result alias
//! - Configuration loading (CLI → ENV → TOML → compiled defaults)
//! - Upload directory initialization

pub mod config;
pub mod error;

pub use error::{Error, Result};
