// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batching of documents into bulk writes.

mod pending_queue;

pub use pending_queue::{FlushBatch, FlushReason, PendingQueue};
