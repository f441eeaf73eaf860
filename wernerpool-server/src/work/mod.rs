//! Work distribution: templates, jobs, and the byte-level pieces miners
//! hash against.

pub mod address;
pub mod coinbase;
pub mod endian;
pub mod job;
pub mod merkle;
pub mod template;

pub use coinbase::CoinbaseBuilder;
pub use job::Job;
pub use template::{BlockTemplate, TemplateManager};
