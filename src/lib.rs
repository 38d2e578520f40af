// src/lib.rs

pub mod align;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod probsevere;
pub mod raster;
pub mod store;

pub use error::{Error, Result};
