pub mod batch;
pub mod buffer;
pub mod codec;
pub mod column_reader;
pub mod compression;
pub mod config;
pub mod error;
pub mod schema;
pub mod shuffle;

pub use crate::error::{Error, Result};

#[cfg(test)]
mod tests;
