//! Declarative hosting stack for a static website.
//!
//! A stack is declared as a graph of resource nodes (bucket, bucket policy, content
//! objects, origin-access-identity, CDN distribution and an optional swag request) whose
//! inputs may reference other nodes' outputs. The [`engine`] reconciles that graph with
//! the state recorded in a local SQLite store through pluggable providers.

pub mod config;
pub mod content;
pub mod db;
pub mod engine;
pub mod graph;
pub mod models;
pub mod policy;
pub mod provider;
pub mod render;
pub mod stack;
