//! Listing query: filters, sort allow-list and pagination metadata.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::ValidationErrors;

use super::Movie;
use crate::config::Limits;
use crate::validation::failure;

const DEFAULT_PAGE: u64 = 1;
const DEFAULT_PAGE_SIZE: u64 = 20;
const DESCENDING: char = '-';

/// Sortable columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Year,
    Runtime,
}

impl SortColumn {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "id" => Some(Self::Id),
            "title" => Some(Self::Title),
            "year" => Some(Self::Year),
            "runtime" => Some(Self::Runtime),
            _ => None,
        }
    }

    /// Column name, safe to interpolate into SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Year => "year",
            Self::Runtime => "runtime",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sort {
    pub column: SortColumn,
    pub descending: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            column: SortColumn::Id,
            descending: false,
        }
    }
}

impl Sort {
    /// Compare two movies on the sort column, falling back on ascending id.
    pub fn compare(&self, a: &Movie, b: &Movie) -> Ordering {
        let primary = match self.column {
            SortColumn::Id => a.id.cmp(&b.id),
            SortColumn::Title => a.title.cmp(&b.title),
            SortColumn::Year => a.year.cmp(&b.year),
            SortColumn::Runtime => a.runtime.cmp(&b.runtime),
        };
        let primary = if self.descending {
            primary.reverse()
        } else {
            primary
        };

        primary.then_with(|| a.id.cmp(&b.id))
    }

    /// `ASC` or `DESC`.
    pub fn direction(&self) -> &'static str {
        if self.descending { "DESC" } else { "ASC" }
    }
}

/// Validated listing parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Filters {
    pub page: u64,
    pub page_size: u64,
    pub sort: Sort,
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
    /// Every listed genre must be carried by a movie.
    pub genres: Vec<String>,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort: Sort::default(),
            title: None,
            genres: Vec::new(),
        }
    }
}

impl Filters {
    /// Read and validate the query string.
    pub fn parse(
        query: &HashMap<String, String>,
        limits: &Limits,
    ) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut filters = Filters::default();

        if let Some(page) = read_integer(query, "page", &mut errors) {
            if page < 1 {
                errors.add("page", failure("range", "must be greater than zero"));
            } else if page as u64 > limits.max_page {
                errors.add(
                    "page",
                    failure("range", "must be a maximum of 10 million"),
                );
            } else {
                filters.page = page as u64;
            }
        }

        if let Some(size) = read_integer(query, "page_size", &mut errors) {
            if size < 1 {
                errors.add(
                    "page_size",
                    failure("range", "must be greater than zero"),
                );
            } else if size as u64 > limits.max_page_size {
                errors.add("page_size", failure("range", "must be a maximum of 100"));
            } else {
                filters.page_size = size as u64;
            }
        }

        if let Some(sort) = query.get("sort").filter(|s| !s.is_empty()) {
            let (descending, column) = match sort.strip_prefix(DESCENDING) {
                Some(column) => (true, column),
                None => (false, sort.as_str()),
            };
            match SortColumn::parse(column) {
                Some(column) => filters.sort = Sort { column, descending },
                None => errors.add("sort", failure("allow_list", "invalid sort value")),
            }
        }

        filters.title = query
            .get("title")
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty());

        filters.genres = query
            .get("genres")
            .map(|g| {
                g.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        if errors.is_empty() {
            Ok(filters)
        } else {
            Err(errors)
        }
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// Whether a movie passes the title and genre filters.
    pub fn matches(&self, movie: &Movie) -> bool {
        let title = self.title.as_ref().is_none_or(|needle| {
            movie.title.to_lowercase().contains(&needle.to_lowercase())
        });
        let genres = self.genres.iter().all(|g| movie.genres.contains(g));

        title && genres
    }
}

/// Values are read signed so that `0` and negatives report a range error.
/// An empty value keeps the default.
fn read_integer(
    query: &HashMap<String, String>,
    key: &'static str,
    errors: &mut ValidationErrors,
) -> Option<i64> {
    let raw = query.get(key).filter(|raw| !raw.is_empty())?;
    match raw.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.add(key, failure("integer", "must be an integer value"));
            None
        },
    }
}

/// Pagination metadata returned next to a listing page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub current_page: u64,
    pub page_size: u64,
    pub first_page: u64,
    pub last_page: u64,
    pub total_records: u64,
}

impl Metadata {
    pub fn calculate(total_records: u64, page: u64, page_size: u64) -> Self {
        let last_page = total_records.div_ceil(page_size.max(1)).max(1);

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page,
            total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn message(errors: &ValidationErrors, field: &str) -> String {
        errors.field_errors()[field][0]
            .message
            .as_deref()
            .unwrap_or_default()
            .to_owned()
    }

    #[test]
    fn test_defaults() {
        let filters = Filters::parse(&HashMap::new(), &Limits::default()).unwrap();
        assert_eq!(filters, Filters::default());
        assert_eq!(filters.offset(), 0);
        assert_eq!(filters.limit(), 20);
    }

    #[test]
    fn test_empty_values_keep_defaults() {
        let filters = Filters::parse(
            &query(&[("page", ""), ("page_size", ""), ("sort", "")]),
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(filters, Filters::default());
    }

    #[test]
    fn test_sort_allow_list() {
        let limits = Limits::default();

        let filters = Filters::parse(&query(&[("sort", "-year")]), &limits).unwrap();
        assert_eq!(
            filters.sort,
            Sort {
                column: SortColumn::Year,
                descending: true
            }
        );

        for bad in ["23", "rating", "--id", "id;DROP"] {
            let errors = Filters::parse(&query(&[("sort", bad)]), &limits).unwrap_err();
            assert_eq!(message(&errors, "sort"), "invalid sort value");
        }
    }

    #[test]
    fn test_page_errors() {
        let limits = Limits::default();

        let errors = Filters::parse(&query(&[("page", "l")]), &limits).unwrap_err();
        assert_eq!(message(&errors, "page"), "must be an integer value");

        let errors = Filters::parse(&query(&[("page", "0"), ("page_size", "101")]), &limits)
            .unwrap_err();
        assert_eq!(message(&errors, "page"), "must be greater than zero");
        assert_eq!(message(&errors, "page_size"), "must be a maximum of 100");

        let errors = Filters::parse(&query(&[("page", "10000001")]), &limits).unwrap_err();
        assert_eq!(message(&errors, "page"), "must be a maximum of 10 million");
    }

    #[test]
    fn test_offset() {
        let filters = Filters::parse(
            &query(&[("page", "3"), ("page_size", "5")]),
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(filters.offset(), 10);
    }

    #[test]
    fn test_genres_and_title() {
        let filters = Filters::parse(
            &query(&[("genres", "drama, crime"), ("title", " club ")]),
            &Limits::default(),
        )
        .unwrap();

        assert_eq!(filters.genres, vec!["drama".to_string(), "crime".to_string()]);
        assert_eq!(filters.title.as_deref(), Some("club"));
    }

    #[test]
    fn test_metadata() {
        assert_eq!(Metadata::calculate(3, 1, 20).last_page, 1);
        assert_eq!(Metadata::calculate(0, 1, 20).last_page, 1);
        assert_eq!(Metadata::calculate(41, 2, 20).last_page, 3);

        let metadata = Metadata::calculate(3, 1, 20);
        assert_eq!(
            serde_json::to_string(&metadata).unwrap(),
            r#"{"current_page":1,"page_size":20,"first_page":1,"last_page":1,"total_records":3}"#
        );
    }
}
