// src/lib.rs

//! Larder Package Keeper
//!
//! A schema-driven package database: a structurally-typed,
//! content-addressed binary object store holding package metadata (the
//! installed set, repository indices and per-package manifests) plus the
//! machinery converting between its compact binary form, a human-readable
//! rendering and the in-memory object graph.
//!
//! # Architecture
//!
//! - Values and pools: 32-bit tagged handles over deduplicating pools
//! - Schemas: immutable static tables driving parse, print and ordering
//! - Builders: the only mutation path, with sticky error propagation
//! - Domain layer: dependency, package, manifest and index schemas
//! - Collaborators: multipart gzip streams, URL fetch, signature checks,
//!   the managed filesystem root and the query CLI

pub mod db;
mod error;
pub mod packages;
pub mod query;
pub mod repository;
pub mod sign;
pub mod store;
pub mod stream;
pub mod version;

pub use error::{Error, FetchError, Result};
