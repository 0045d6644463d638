//! Shared infrastructure for the Plinth web application
//!
//! This crate provides the pieces the web service builds on: PostgreSQL
//! connection pooling, Redis connectivity for session storage, and the
//! shared error types.

pub mod cache;
pub mod database;
pub mod error;
