//! Store error and pagination primitives
//!
//! Shared by every store trait in this crate. Engines depend on the traits
//! only, so tests run against the in-memory implementations.

/// Failure modes common to all stores.
///
/// `NotFound` and `Conflict` carry a ready-to-serve message; the API layer
/// passes it through without reformatting.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    #[error("row payload failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Window into a list query. The API speaks pageSize/offset, so this is
/// limit/offset all the way down.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }

    /// Clamp to sane bounds before hitting the database.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, 100),
            offset: self.offset.max(0),
        }
    }
}

/// One page of results plus the total the query matched.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            limit: pagination.limit,
            offset: pagination.offset,
        }
    }

    /// Whether another page exists past this one.
    pub fn has_next(&self) -> bool {
        self.offset + self.limit < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps_out_of_range_input() {
        let p = Pagination::new(5000, -3).clamped();
        assert_eq!(p.limit, 100);
        assert_eq!(p.offset, 0);

        let p = Pagination::new(0, 7).clamped();
        assert_eq!(p.limit, 1);
        assert_eq!(p.offset, 7);
    }

    #[test]
    fn test_has_next_respects_total() {
        let first = PaginatedResult::new(vec![1, 2, 3], 7, Pagination::new(3, 0));
        assert!(first.has_next());

        let last = PaginatedResult::new(vec![7], 7, Pagination::new(3, 6));
        assert!(!last.has_next());
    }
}
