//! File system helpers for capture and restore.

pub mod metadata;
pub mod walker;
