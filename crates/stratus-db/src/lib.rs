//! Stratus DB - PostgreSQL document store
//!
//! This crate implements the `DocumentStore` trait from `stratus-core` on top
//! of a JSONB table, one transaction per write batch.
//!
//! # Overview
//!
//! The main components are:
//! - [`DocumentRepository`] - Keyed document persistence with merge/replace writes
//! - [`kind_for_sqlstate`] / [`store_error`] - SQLSTATE to store error kind mapping

mod classify;
mod repository;

pub use classify::{kind_for_sqlstate, store_error};
pub use repository::{DEFAULT_DATABASE, DocumentRepository, MIGRATIONS};
