pub mod affine;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fsl;
pub mod graph;
pub mod image;
pub mod outcome;
pub mod primitives;
pub mod space;
pub mod subject;
pub mod transforms;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
