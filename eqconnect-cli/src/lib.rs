//! # eqconnect-cli: console front end
//!
//! Connects to an equalizer server and turns lines typed on stdin into
//! client intents, printing state changes as they arrive.
//!
//! ## Pieces
//!
//! - **config**: TOML configuration with defaults for every section.
//! - **commands**: parser for the console command language.

pub mod commands;
pub mod config;
