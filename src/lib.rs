//! # kvtx
//!
//! Transactional execution core of a Redis-compatible in-memory store.
//!
//! Commands run through a [`command::Registry`] of typed command families.
//! The [`engine::Engine`] groups them into atomic transactions under key-level
//! locks, undoes partial work when a command fails, and hands committed writes
//! to an append-only log in a replay-safe form.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod resp;
pub mod store;
pub mod transaction;
pub mod types;
