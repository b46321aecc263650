//! # Strand Context Configuration
//!
//! Sizing and timing knobs for one actor context: worker threads, strands per
//! thread, pool reserves, mailbox cache size and the default request timeout.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strand_config::ContextConfig;
//!
//! // Defaults sized from the host
//! let config = ContextConfig::default();
//!
//! // Base file plus config/environments/prod.toml plus STRAND_* variables
//! let config = ContextConfig::load(Some("config/context.toml".as_ref()), Some("prod")).unwrap();
//! ```

pub mod context_config;
pub mod defaults;

pub use context_config::{default_config_path, load_config, ContextConfig};
