// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational system of record.
//!
//! - [`SqlRowStore`]: MySQL / SQLite via sqlx
//! - [`MemoryRowStore`]: in-process tables for tests and embedding

pub(crate) mod relations;
mod memory;
mod sql;
mod traits;

pub use memory::MemoryRowStore;
pub use sql::SqlRowStore;
pub use traits::{RelationalStore, RowFilter, RowOrder, RowQuery};
