//! buildrec-core
//!
//! Reader, writer and inspection toolkit for container build records.
//!
//! # Modules
//! - **codec**: record encode/decode and the nested-string pass
//! - **domain**: record model, lifecycle transitions, consistency report
//! - **params**: typed `USER_PARAMS` (kinds, defaults, validation, naming)
//! - **plugins**: plugin template rendering from user params
//! - **ports**: `Clock`, `RecordStore`
//! - **impls**: in-memory `RecordStore`

pub mod codec;
pub mod domain;
pub mod error;
pub mod impls;
pub mod params;
pub mod plugins;
pub mod ports;

pub use error::BuildrecError;
