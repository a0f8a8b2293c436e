//! # Conversation Memory
//!
//! A personal semantic memory for multi-turn conversations with AI
//! assistants.
//!
//! Conversations are stored as authoritative JSON records, split into
//! user/assistant chunks, embedded, and kept in a vector index that can be
//! rebuilt from the records at any time. On top of that index the
//! relationship engine answers "what did I discuss about X", "which past
//! conversations resemble this one" and "what topics does each project
//! cover".
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Record store │──▶│   Indexer   │──▶│ Vector index │
//! │  JSON files  │   │ Chunk+Embed │   │    SQLite    │
//! └──────┬───────┘   └─────────────┘   └──────┬───────┘
//!        │                                     │
//!        └──────────────┬──────────────────────┘
//!                       ▼
//!               ┌───────────────┐       ┌──────────┐
//!               │  Relationship │──────▶│   CLI    │
//!               │    engine     │       │ (recall) │
//!               └───────────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recall init                         # create the index database
//! recall import export.json           # store and index conversations
//! recall search "cache eviction" --project demo
//! recall graph similar 20250301-3fa2c1d9
//! recall rebuild                      # regenerate the index from records
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Conversations, messages, chunks and decision records |
//! | [`identity`] | Content-addressed conversation IDs |
//! | [`chunk`] | Conversation chunking |
//! | [`store`] | Record store and vector index contracts |
//! | [`sqlite_index`] | SQLite vector index |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`indexer`] | Upsert, re-index and rebuild |
//! | [`relate`] | Search and relationship discovery |
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod graph_cmd;
pub mod identity;
pub mod index_cmd;
pub mod indexer;
pub mod ingest;
pub mod list;
pub mod migrate;
pub mod models;
pub mod relate;
pub mod search;
pub mod services;
pub mod sqlite_index;
pub mod stats;
pub mod store;
