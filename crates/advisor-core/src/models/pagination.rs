use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_NUMBER, MAX_PAGE_SIZE};
use crate::error::AppError;

/// `?page=&page_size=` query parameters. Page numbers start at 1.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).clamp(1, MAX_PAGE_NUMBER)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn limit(&self) -> i64 {
        self.page_size()
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }
}

/// Page of results with the total row count.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Paginated<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(results: Vec<T>, count: i64, params: &PageParams) -> Self {
        let page = params.page();
        let page_size = params.page_size();
        let total_pages = if count == 0 {
            0
        } else {
            (count + page_size - 1) / page_size
        };
        Paginated {
            count,
            page,
            page_size,
            total_pages,
            next: (page < total_pages).then_some(page + 1),
            previous: (page > 1).then_some(page - 1),
            results,
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paginated<U> {
        Paginated {
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// Parsed `?ordering=` value: a whitelisted column and a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: &'static str,
    pub descending: bool,
}

impl SortOrder {
    /// Parses `field` or `-field`. `allowed` maps public field names to SQL columns,
    /// so user input never reaches the query text.
    pub fn parse(
        input: Option<&str>,
        allowed: &[(&str, &'static str)],
        default: SortOrder,
    ) -> Result<SortOrder, AppError> {
        let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(default);
        };
        let (name, descending) = match raw.strip_prefix('-') {
            Some(name) => (name, true),
            None => (raw, false),
        };
        allowed
            .iter()
            .find(|(public, _)| *public == name)
            .map(|(_, column)| SortOrder {
                column: *column,
                descending,
            })
            .ok_or_else(|| {
                let names: Vec<&str> = allowed.iter().map(|(public, _)| *public).collect();
                AppError::field(
                    "ordering",
                    format!("Unsupported ordering '{}'. Use one of: {}", raw, names.join(", ")),
                )
            })
    }

    pub fn to_sql(&self) -> String {
        format!(
            "{} {}",
            self.column,
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_clamp() {
        let params = PageParams {
            page: Some(0),
            page_size: Some(1000),
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.page_size(), MAX_PAGE_SIZE);
        assert_eq!(params.offset(), 0);

        let params = PageParams {
            page: Some(3),
            page_size: Some(10),
        };
        assert_eq!(params.offset(), 20);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let params = PageParams {
            page: Some(i64::MAX),
            page_size: Some(i64::MAX),
        };
        assert_eq!(params.page(), MAX_PAGE_NUMBER);
        assert_eq!(params.offset(), (MAX_PAGE_NUMBER - 1) * MAX_PAGE_SIZE);

        let page = Paginated::new(Vec::<i32>::new(), 5, &params);
        assert_eq!(page.next, None);
        assert_eq!(page.previous, Some(MAX_PAGE_NUMBER - 1));

        let params = PageParams {
            page: Some(i64::MIN),
            page_size: Some(i64::MIN),
        };
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn paginated_links() {
        let params = PageParams {
            page: Some(2),
            page_size: Some(10),
        };
        let page = Paginated::new(vec![1, 2, 3], 25, &params);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));

        let empty: Paginated<i32> = Paginated::new(vec![], 0, &PageParams::default());
        assert_eq!(empty.total_pages, 0);
        assert_eq!(empty.next, None);
        assert_eq!(empty.previous, None);
    }

    #[test]
    fn sort_order_uses_whitelist() {
        const ALLOWED: &[(&str, &str)] = &[("created_at", "c.created_at"), ("company_name", "c.company_name")];
        let default = SortOrder {
            column: "c.created_at",
            descending: true,
        };

        let order = SortOrder::parse(Some("-company_name"), ALLOWED, default).unwrap();
        assert_eq!(order.to_sql(), "c.company_name DESC");

        let order = SortOrder::parse(None, ALLOWED, default).unwrap();
        assert_eq!(order, default);

        let err = SortOrder::parse(Some("password; drop table"), ALLOWED, default).unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("ordering"));
    }
}
