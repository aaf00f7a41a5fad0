// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Text normalization applied to string fields before indexing.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalizes string field values before they go into a document.
pub trait Transliterate: Send + Sync + std::fmt::Debug {
    fn transliterate(&self, text: &str) -> String;
}

/// Unicode-aware lowercasing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lowercase;

impl Transliterate for Lowercase {
    fn transliterate(&self, text: &str) -> String {
        text.to_lowercase()
    }
}

/// Decompose, strip combining marks, then lowercase (`"Crème Brûlée"` → `"creme brulee"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiFold;

impl Transliterate for AsciiFold {
    fn transliterate(&self, text: &str) -> String {
        text.nfkd()
            .filter(|c| !is_combining_mark(*c))
            .collect::<String>()
            .to_lowercase()
    }
}
