//! # boxlink-db: Database Layer for boxlink
//!
//! SQLite persistence for the delivery engine, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        boxlink Data Flow                                │
//! │                                                                         │
//! │  ConnectionCache miss            BlackboxQueue enqueue/flush            │
//! │       │                                  │                              │
//! │       ▼                                  ▼                              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   boxlink-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ BoxRepository │    │  (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │ KvRepository  │    │ 001_init.sql │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use boxlink_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("boxlink.db")).await?;
//! let backlog = db.kv().get("pos_bb_queue_abc").await?;
//! let boxes = db.boxes().search(&[BoxId::new(7)]).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::boxes::BoxRepository;
pub use repository::kv::KvRepository;
