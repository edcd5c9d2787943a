//! Pagination parameters and results for upstream list calls.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Largest page size the upstream accepts.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Parameters of a list call.
///
/// # Examples
///
/// ```
/// use deskgate_core::types::ListQuery;
///
/// let query = ListQuery::new(25, 50).with_status("open");
/// assert!(query.validate().is_ok());
/// assert_eq!(query.page_number(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Page size, 1 to 100.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Items to skip.
    #[serde(default)]
    pub offset: u32,
    /// Folder filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<u64>,
    /// Status filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Free-text search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT, 0)
    }
}

impl ListQuery {
    /// Creates a query without filters.
    #[must_use]
    pub const fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit,
            offset,
            folder_id: None,
            status: None,
            search: None,
        }
    }

    /// Restricts results to a folder.
    #[must_use]
    pub const fn with_folder(mut self, folder_id: u64) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    /// Restricts results to a status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Adds a search term.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Checks the page size bounds.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(GatewayError::invalid(
                "limit",
                format!("limit must be between 1 and {MAX_PAGE_LIMIT}, got {}", self.limit),
            ));
        }
        Ok(())
    }

    /// One-based page number derived from offset and limit.
    #[must_use]
    pub const fn page_number(&self) -> u32 {
        if self.limit == 0 {
            1
        } else {
            self.offset / self.limit + 1
        }
    }

    /// Query string pairs, skipping empty filters.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("limit".to_string(), self.limit.to_string()),
            ("offset".to_string(), self.offset.to_string()),
        ];
        if let Some(folder_id) = self.folder_id {
            pairs.push(("folder_id".to_string(), folder_id.to_string()));
        }
        let filters = [("status", &self.status), ("search", &self.search)];
        for (key, value) in filters {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                pairs.push((key.to_string(), value.to_string()));
            }
        }
        pairs
    }
}

/// One page of a list call.
///
/// The upstream does not always report totals, so `has_more` is true
/// whenever a full page came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Number of items on this page.
    pub count: usize,
    /// Requested page size.
    pub limit: u32,
    /// Requested offset.
    pub offset: u32,
    /// One-based page number.
    pub page: u32,
    /// Whether another page may follow.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Builds a page from the items returned for a query.
    #[must_use]
    pub fn from_items(items: Vec<T>, query: &ListQuery) -> Self {
        let count = items.len();
        Self {
            items,
            count,
            limit: query.limit,
            offset: query.offset,
            page: query.page_number(),
            has_more: count == query.limit as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_bounds() {
        assert!(ListQuery::new(0, 0).validate().unwrap_err().is_validation_error());
        assert!(ListQuery::new(101, 0).validate().is_err());
        assert!(ListQuery::new(1, 0).validate().is_ok());
        assert!(ListQuery::new(100, 0).validate().is_ok());
    }

    #[test]
    fn test_page_number() {
        assert_eq!(ListQuery::new(50, 0).page_number(), 1);
        assert_eq!(ListQuery::new(50, 50).page_number(), 2);
        assert_eq!(ListQuery::new(50, 75).page_number(), 2);
    }

    #[test]
    fn test_pairs_skip_blank_filters() {
        let query = ListQuery::new(10, 20).with_folder(7).with_status("open").with_search("  ");
        let pairs = query.to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "10".to_string()),
                ("offset".to_string(), "20".to_string()),
                ("folder_id".to_string(), "7".to_string()),
                ("status".to_string(), "open".to_string()),
            ]
        );
    }

    #[test]
    fn test_has_more_heuristic() {
        let query = ListQuery::new(2, 0);
        let full = Page::from_items(vec![1, 2], &query);
        assert!(full.has_more);
        assert_eq!(full.count, 2);

        let partial = Page::from_items(vec![1], &query);
        assert!(!partial.has_more);
    }
}
