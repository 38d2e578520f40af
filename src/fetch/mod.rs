// src/fetch/mod.rs

pub mod catalog;
pub mod payloads;
