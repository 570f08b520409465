//! Result envelope for paginated queries.
//!
//! Every query path returns a [`GenericQueryResult`] holding one page of results along
//! with the pagination parameters that produced it.

use serde::{Deserialize, Serialize};

use crate::document::UntypedDocument;

/// A single page of query results.
///
/// # Type Parameters
///
/// * `T` - The type of items contained in this page
///
/// # Example
///
/// ```ignore
/// use ravenlayer::page::GenericQueryResult;
///
/// let page = GenericQueryResult::builder(vec!["a", "b"])
///     .with_skip(0)
///     .with_take(2)
///     .build();
///
/// assert_eq!(page.total_count, 2);
/// assert!(page.has_more);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenericQueryResult<T> {
    /// The items contained in this page, in the order the store returned them.
    pub results: Vec<T>,
    /// Number of items in this page. This is not a count of every matching document.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_count: usize,
    /// Number of items skipped before this page.
    pub skip: usize,
    /// Page size the query ran with, after normalization.
    pub take: usize,
    /// `true` when the page came back completely full.
    ///
    /// A full page is only a hint that more results exist: a collection whose size is
    /// an exact multiple of `take` reports `true` on its last page.
    pub has_more: bool,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

/// Untyped query result, one [`UntypedDocument`] per entry.
pub type QueryResult = GenericQueryResult<UntypedDocument>;

impl<T> GenericQueryResult<T> {
    /// Creates a new builder for a page holding `results`.
    pub fn builder(results: Vec<T>) -> GenericQueryResultBuilder<T> {
        GenericQueryResultBuilder::new(results)
    }

    /// Number of items in this page.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if the page holds no items.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterates over the items of this page.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.results.iter()
    }

    /// Converts every item, keeping the pagination metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> GenericQueryResult<U> {
        GenericQueryResult {
            results: self.results.into_iter().map(f).collect(),
            total_count: self.total_count,
            skip: self.skip,
            take: self.take,
            has_more: self.has_more,
        }
    }
}

impl<T> Default for GenericQueryResult<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            total_count: 0,
            skip: 0,
            take: 0,
            has_more: false,
        }
    }
}

impl<T> IntoIterator for GenericQueryResult<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Builder for constructing [`GenericQueryResult`] instances.
///
/// The derived fields, `total_count` and `has_more`, are computed in
/// [`GenericQueryResultBuilder::build`].
pub struct GenericQueryResultBuilder<T> {
    results: Vec<T>,
    skip: usize,
    take: usize,
}

impl<T> GenericQueryResultBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(results: Vec<T>) -> Self {
        Self {
            results,
            skip: 0,
            take: 0,
        }
    }

    /// Sets the number of items skipped before this page.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the page size the query ran with.
    pub fn with_take(mut self, take: usize) -> Self {
        self.take = take;
        self
    }

    /// Builds the page. `total_count` is the number of items and `has_more` is set when
    /// `take` is non-zero and the page holds exactly `take` items.
    pub fn build(self) -> GenericQueryResult<T> {
        let total_count = self.results.len();

        GenericQueryResult {
            results: self.results,
            total_count,
            skip: self.skip,
            take: self.take,
            has_more: self.take > 0 && total_count == self.take,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(3, 1024, false)]
    #[case(25, 25, true)]
    #[case(24, 25, false)]
    #[case(0, 0, false)]
    #[case(0, 25, false)]
    fn has_more_means_a_full_page(
        #[case] len: usize,
        #[case] take: usize,
        #[case] expected: bool,
    ) {
        let page = GenericQueryResult::builder(vec![(); len])
            .with_take(take)
            .build();

        assert_eq!(page.total_count, len);
        assert_eq!(page.has_more, expected);
    }

    #[test]
    fn map_keeps_pagination() {
        let page = GenericQueryResult::builder(vec![1, 2])
            .with_skip(4)
            .with_take(2)
            .build()
            .map(|n| n * 10);

        assert_eq!(page.results, vec![10, 20]);
        assert_eq!((page.skip, page.take, page.has_more), (4, 2, true));
    }

    #[test]
    fn serializes_with_original_field_names() {
        let page = GenericQueryResult::builder(vec!["a"]).with_take(25).build();

        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            serde_json::json!({
                "results": ["a"],
                "totalCount": 1,
                "skip": 0,
                "take": 25,
                "hasMore": false,
            })
        );
    }
}
