// src/lib.rs

//! Settle: package status database and configuration engine
//!
//! Tracks what is installed and available, merges configuration files a
//! user has edited with the versions a new package ships, and configures
//! unpacked packages in dependency order, processing triggers as they fire.
//!
//! # Architecture
//!
//! - Status database: every package record in SQLite, written through on
//!   each change
//! - Conffiles: three-way hash comparison, prompting only on real conflicts
//! - Scheduler: retry rounds with cycle breaking instead of a global sort
//! - Maintainer scripts and prompts behind traits, so runs can be tested
//!   without spawning processes

pub mod available;
pub mod buffer;
pub mod conffile;
pub mod config;
pub mod db;
pub mod diversion;
mod error;
pub mod lock;
pub mod pkg;
pub mod scheduler;
pub mod script;
pub mod status;
pub mod trigger;
pub mod version;

pub use error::{Error, Result, Severity};
