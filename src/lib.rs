//! Imprint library crate
//!
//! This crate provides both a CLI binary and a library API for programmatic use

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hasher;
pub mod output;
pub mod progress;
pub mod reconciler;
pub mod snapshot;
pub mod store;
