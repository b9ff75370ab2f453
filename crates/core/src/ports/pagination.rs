//! Pagination types for list queries.
//!
//! These types implement Relay-style forward cursor pagination, used by
//! the GraphQL grant listings.

/// Default page size when `first` is not given.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Opaque cursor for pagination.
///
/// The cursor value is implementation-specific and should be treated
/// as an opaque token by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub value: String,
}

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Forward pagination parameters.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    /// Number of items to fetch.
    pub first: Option<usize>,
    /// Cursor to start after.
    pub after: Option<Cursor>,
}

impl Pagination {
    /// Effective page size, clamped to `[1, MAX_PAGE_SIZE]`.
    pub fn limit(&self) -> usize {
        self.first.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

/// Paginated result set with edges and page info.
///
/// This is the Relay connection pattern for cursor-based pagination.
#[derive(Debug, Clone)]
pub struct Connection<T> {
    /// List of edges (node + cursor pairs).
    pub edges: Vec<Edge<T>>,
    /// Information about the current page.
    pub page_info: PageInfo,
    /// Total count of matching items.
    pub total_count: usize,
}

/// A single item in a paginated result.
#[derive(Debug, Clone)]
pub struct Edge<T> {
    /// The actual item.
    pub node: T,
    /// Cursor for this item (used for pagination).
    pub cursor: Cursor,
}

/// Information about the current page in a paginated result.
#[derive(Debug, Clone, Default)]
pub struct PageInfo {
    /// Whether there are more items after this page.
    pub has_next_page: bool,
    /// Whether there are items before this page.
    pub has_previous_page: bool,
    /// Cursor of the first item in this page.
    pub start_cursor: Option<Cursor>,
    /// Cursor of the last item in this page.
    pub end_cursor: Option<Cursor>,
}

impl<T> Connection<T> {
    /// Build a page from an already-ordered iterator of all matches.
    ///
    /// `cursor_of` gives each item's cursor; items up to and including
    /// `pagination.after` are skipped. An `after` cursor that matches no
    /// item yields an empty page.
    pub fn paginate<I, F>(items: I, pagination: &Pagination, cursor_of: F) -> Self
    where
        I: IntoIterator<Item = T>,
        F: Fn(&T) -> Cursor,
    {
        let all: Vec<Edge<T>> = items
            .into_iter()
            .map(|node| {
                let cursor = cursor_of(&node);
                Edge { node, cursor }
            })
            .collect();
        let total_count = all.len();

        let start = match &pagination.after {
            Some(after) => all
                .iter()
                .position(|edge| &edge.cursor == after)
                .map_or(all.len(), |pos| pos + 1),
            None => 0,
        };
        let limit = pagination.limit();
        let has_next_page = all.len() > start + limit;
        let edges: Vec<Edge<T>> = all.into_iter().skip(start).take(limit).collect();

        let page_info = PageInfo {
            has_next_page,
            has_previous_page: start > 0,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        };

        Self {
            edges,
            page_info,
            total_count,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(n: &u32) -> Cursor {
        Cursor::new(n.to_string())
    }

    #[test]
    fn first_page_has_next() {
        let page = Connection::paginate(
            1..=5u32,
            &Pagination {
                first: Some(2),
                after: None,
            },
            cursor,
        );
        assert_eq!(page.nodes().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert!(page.page_info.has_next_page);
        assert!(!page.page_info.has_previous_page);
        assert_eq!(page.page_info.end_cursor, Some(Cursor::new("2")));
        assert_eq!(page.total_count, 5);
    }

    #[test]
    fn after_cursor_resumes() {
        let page = Connection::paginate(
            1..=5u32,
            &Pagination {
                first: Some(10),
                after: Some(Cursor::new("3")),
            },
            cursor,
        );
        assert_eq!(page.nodes().copied().collect::<Vec<_>>(), vec![4, 5]);
        assert!(!page.page_info.has_next_page);
        assert!(page.page_info.has_previous_page);
    }

    // Test critique: un curseur inconnu ne doit jamais renvoyer la première page
    #[test]
    fn unknown_cursor_yields_empty_page() {
        let page = Connection::paginate(
            1..=5u32,
            &Pagination {
                first: Some(2),
                after: Some(Cursor::new("42")),
            },
            cursor,
        );
        assert!(page.edges.is_empty());
        assert!(!page.page_info.has_next_page);
        assert_eq!(page.page_info.start_cursor, None);
        assert_eq!(page.page_info.end_cursor, None);
        assert_eq!(page.total_count, 5);
    }

    #[test]
    fn limit_is_clamped() {
        let p = Pagination {
            first: Some(10_000),
            after: None,
        };
        assert_eq!(p.limit(), MAX_PAGE_SIZE);
        assert_eq!(Pagination::default().limit(), DEFAULT_PAGE_SIZE);
        let zero = Pagination {
            first: Some(0),
            after: None,
        };
        assert_eq!(zero.limit(), 1);
    }
}
