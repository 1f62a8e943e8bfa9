//! # Repository Module
//!
//! Database repository implementations for boxlink.
//!
//! ## Available Repositories
//!
//! - [`KvRepository`](kv::KvRepository) - Durable key-value strings (queue backlog)
//! - [`BoxRepository`](boxes::BoxRepository) - IoT box directory

pub mod boxes;
pub mod kv;
