//! Filter, sort, and pagination planning for list queries.
//!
//! Every caller-supplied parameter is validated before a plan exists. The
//! sort column in a [`QueryPlan`] always comes from a `'static` safelist
//! entry, never from the caller's string, so nothing the caller sends is
//! ever spliced into SQL text.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{title_words, Key, TuneStatus};
use crate::validate::{permitted_value, FieldErrors, Validate, Validator};

/// Hard ceiling on `page`, to block pathological offsets.
pub const MAX_PAGE: i64 = 10_000;
pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Sort values accepted when listing tunes. A leading `-` means descending.
pub const TUNE_SORT_SAFELIST: &[&str] = &[
    "id",
    "title",
    "status",
    "created_at",
    "-id",
    "-title",
    "-status",
    "-created_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Paging and sorting parameters, checked against a declared safelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    /// Defaults: first page, 20 rows, sorted by id ascending.
    #[must_use]
    pub fn new(sort_safelist: &'static [&'static str]) -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort: "id".to_string(),
            sort_safelist,
        }
    }

    /// The safelisted column for `sort`, with any `-` stripped.
    ///
    /// `None` when `sort` is not in the safelist.
    #[must_use]
    pub fn sort_column(&self) -> Option<&'static str> {
        self.sort_safelist
            .iter()
            .find(|entry| **entry == self.sort)
            .map(|entry| entry.trim_start_matches('-'))
    }

    #[must_use]
    pub fn direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }

    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.page_size
    }

    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

impl Validate for Filters {
    fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= MAX_PAGE, "page", "must be a maximum of 10000");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(self.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
        v.check(
            permitted_value(&self.sort.as_str(), self.sort_safelist),
            "sort",
            "invalid sort value",
        );
    }
}

/// Optional tune filters. Each empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuneFilter {
    /// Whitespace-separated terms; each must occur in the title.
    pub title: String,
    /// The tune must carry every one of these keys.
    pub keys: Vec<Key>,
    /// The tune's status must be one of these.
    pub statuses: Vec<TuneStatus>,
}

/// A parsed list-tunes request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuneQuery {
    pub filter: TuneFilter,
    pub filters: Filters,
}

impl Default for TuneQuery {
    fn default() -> Self {
        Self {
            filter: TuneFilter::default(),
            filters: Filters::new(TUNE_SORT_SAFELIST),
        }
    }
}

impl TuneQuery {
    /// Parse query-string pairs (`title`, `keys`, `statuses`, `page`,
    /// `page_size`, `sort`). Unknown names are ignored. Parse failures and
    /// range or safelist violations come back together as one validation
    /// error.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = Self::default();
        let mut v = Validator::new();

        for (name, value) in pairs {
            let value = value.as_ref();
            match name.as_ref() {
                "title" => query.filter.title = value.to_string(),
                "keys" => query.filter.keys = csv(value).map(Key::from).collect(),
                "statuses" => {
                    for item in csv(value) {
                        match item.parse() {
                            Ok(status) => query.filter.statuses.push(status),
                            Err(_) => v.add_error("statuses", "must only contain known statuses"),
                        }
                    }
                }
                "page" => {
                    if let Some(page) = integer(value, "page", &mut v) {
                        query.filters.page = page;
                    }
                }
                "page_size" => {
                    if let Some(size) = integer(value, "page_size", &mut v) {
                        query.filters.page_size = size;
                    }
                }
                "sort" if !value.is_empty() => query.filters.sort = value.to_string(),
                _ => {}
            }
        }

        query.filters.validate(&mut v);
        v.finish()?;
        Ok(query)
    }

    /// Validate and build the plan. Fails before anything is constructed
    /// when a parameter is out of range or the sort is not safelisted.
    pub fn plan(&self) -> Result<QueryPlan> {
        self.filters.ensure_valid()?;
        let Some(sort_column) = self.filters.sort_column() else {
            // ensure_valid already rejects this
            return Err(Error::Validation(FieldErrors::single("sort", "invalid sort value")));
        };

        Ok(QueryPlan {
            title_terms: title_words(&self.filter.title),
            keys: self.filter.keys.clone(),
            statuses: self.filter.statuses.clone(),
            sort_column,
            direction: self.filters.direction(),
            page: self.filters.page,
            page_size: self.filters.page_size,
        })
    }
}

/// A validated, bounded query. Only safelisted identifiers reach SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub title_terms: Vec<String>,
    pub keys: Vec<Key>,
    pub statuses: Vec<TuneStatus>,
    pub sort_column: &'static str,
    pub direction: SortDirection,
    pub page: i64,
    pub page_size: i64,
}

impl QueryPlan {
    /// ORDER BY clause body. The primary key breaks ties, so paging is
    /// stable even when the sort column has duplicates.
    #[must_use]
    pub fn order_by(&self) -> String {
        format!("{} {}, id ASC", self.sort_column, self.direction.as_sql())
    }

    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.page_size
    }

    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    #[must_use]
    pub fn metadata(&self, total_records: i64) -> Metadata {
        calculate_metadata(total_records, self.page, self.page_size)
    }
}

/// Pagination metadata for a list response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

/// All zero when `total_records` is zero; otherwise
/// `last_page = ceil(total_records / page_size)`.
#[must_use]
pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records == 0 || page_size <= 0 {
        return Metadata::default();
    }

    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}

fn csv(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn integer(value: &str, field: &str, v: &mut Validator) -> Option<i64> {
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            v.add_error(field, "must be an integer value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(pairs: &[(&str, &str)]) -> Result<TuneQuery> {
        TuneQuery::from_pairs(pairs.iter().copied())
    }

    fn field_error(result: Result<TuneQuery>, field: &str) -> String {
        match result {
            Err(Error::Validation(errors)) => errors.get(field).unwrap_or_default().to_string(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let plan = parse(&[]).unwrap().plan().unwrap();
        assert_eq!(plan.page, 1);
        assert_eq!(plan.page_size, 20);
        assert_eq!(plan.order_by(), "id ASC, id ASC");
        assert_eq!(plan.offset(), 0);
        assert!(plan.title_terms.is_empty());
        assert!(plan.keys.is_empty());
        assert!(plan.statuses.is_empty());
    }

    #[test]
    fn test_sort_outside_safelist_is_rejected() {
        let result = parse(&[("sort", "password")]);
        assert_eq!(field_error(result, "sort"), "invalid sort value");

        let mut query = TuneQuery::default();
        query.filters.sort = "title; DROP TABLE tunes".to_string();
        assert!(matches!(query.plan(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_descending_sort_strips_sign() {
        let plan = parse(&[("sort", "-created_at")]).unwrap().plan().unwrap();
        assert_eq!(plan.sort_column, "created_at");
        assert_eq!(plan.direction, SortDirection::Descending);
        assert_eq!(plan.order_by(), "created_at DESC, id ASC");
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(
            field_error(parse(&[("page", "0")]), "page"),
            "must be greater than zero"
        );
        assert_eq!(
            field_error(parse(&[("page", "10001")]), "page"),
            "must be a maximum of 10000"
        );
        assert!(parse(&[("page", "10000")]).is_ok());
        assert_eq!(
            field_error(parse(&[("page_size", "101")]), "page_size"),
            "must be a maximum of 100"
        );
        assert_eq!(
            field_error(parse(&[("page", "two")]), "page"),
            "must be an integer value"
        );
    }

    #[test]
    fn test_offset_and_limit() {
        let plan = parse(&[("page", "3"), ("page_size", "25")])
            .unwrap()
            .plan()
            .unwrap();
        assert_eq!(plan.limit(), 25);
        assert_eq!(plan.offset(), 50);
    }

    #[test]
    fn test_list_filters_parse() {
        let query = parse(&[
            ("title", "  morning   star "),
            ("keys", "D major,,A minor "),
            ("statuses", "seedling,flowering"),
        ])
        .unwrap();
        assert_eq!(
            query.filter.keys,
            vec![Key::from("D major"), Key::from("A minor")]
        );
        assert_eq!(
            query.filter.statuses,
            vec![TuneStatus::Seedling, TuneStatus::Flowering]
        );

        let plan = query.plan().unwrap();
        assert_eq!(plan.title_terms, vec!["morning", "star"]);

        assert_eq!(
            field_error(parse(&[("statuses", "wilting")]), "statuses"),
            "must only contain known statuses"
        );
    }

    #[test]
    fn test_calculate_metadata() {
        assert_eq!(calculate_metadata(0, 3, 20), Metadata::default());

        let m = calculate_metadata(41, 2, 20);
        assert_eq!(m.current_page, 2);
        assert_eq!(m.first_page, 1);
        assert_eq!(m.last_page, 3);
        assert_eq!(m.total_records, 41);

        assert_eq!(calculate_metadata(40, 1, 20).last_page, 2);
        assert_eq!(calculate_metadata(1, 1, 100).last_page, 1);
    }
}
