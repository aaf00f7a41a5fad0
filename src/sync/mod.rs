// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index synchronization.
//!
//! # Architecture
//!
//! ```text
//! row saved ──→ DocumentMapper ──→ PendingQueue ──(len >= bulk size)──→ bulk write
//!                                       │
//!                                       └── PendingRegistry ──(commit sweep)──→ flush + refresh
//! rebuild ──→ descending pk pages ──→ same queue
//! ```
//!
//! One [`IndexSynchronizer`] per model type. The first write bootstraps the
//! index and the type mapping through its [`IndexBootstrap`] strategy.

mod bootstrap;
mod rebuild;
mod registry;
mod synchronizer;

pub use bootstrap::{DefaultBootstrap, IndexBootstrap};
pub use rebuild::{RebuildOptions, RebuildReport};
pub use registry::PendingRegistry;
pub use synchronizer::IndexSynchronizer;
