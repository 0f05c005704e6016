//! Core types shared across the pipeline

pub mod credential;
pub mod payload;
