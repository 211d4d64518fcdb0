//! Storage layer.

mod fs;
mod migrations;
mod sqlite;

pub use fs::write_atomic;
pub use sqlite::{
    EmbeddingTable, EmbeddingTableStatus, Result, Store, StoreError, StoreStatus,
};
