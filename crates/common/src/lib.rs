//! Common utilities and shared types for taskdesk.
//!
//! This crate provides foundational components used across all taskdesk crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Storage**: Local upload storage with path containment checks
//! - **Cache**: Process-local TTL cache via [`TtlCache`]
//! - **Tokens**: Opaque session and link tokens via [`TokenGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use taskdesk_common::{Config, TokenGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let token = TokenGenerator::new().session_token();
//!     println!("{} -> {}", config.server.url, token);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod storage;
pub mod token;

pub use cache::TtlCache;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use storage::{LocalStorage, StorageBackend, StoredFile, file_extension, secure_filename};
pub use token::TokenGenerator;
