//! Limit/offset pagination shared by listing queries.

use serde::{Deserialize, Serialize};

/// Hard ceiling for a single page.
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    /// Build a page, substituting `default_limit` when no limit is given and
    /// clamping to [`MAX_PAGE_SIZE`].
    pub fn new(limit: Option<u32>, offset: Option<u32>, default_limit: u32) -> Self {
        let limit = limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
        Self {
            limit,
            offset: offset.unwrap_or(0),
        }
    }

    /// Apply this page to an already ordered iterator.
    pub fn slice<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None, 50)
    }
}
