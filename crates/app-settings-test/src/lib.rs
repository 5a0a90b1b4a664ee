//! App Settings Test - Shared test utilities for `app-settings`.
//!
//! This crate provides fixture schemas, mock factories and validators, and
//! a logging harness that can be used as a dev-dependency.
//!
//! # Usage
//!
//! ```rust,ignore
//! use app_settings_test::{backends_schema, backends_source, setup_test_logging_default};
//!
//! #[test]
//! fn test_backends() {
//!     setup_test_logging_default();
//!     let settings = app_settings::AppSettings::new(backends_schema(), backends_source());
//!     assert!(settings.get("BACKENDS").is_ok());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
