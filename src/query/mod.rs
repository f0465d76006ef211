//! Paginated, searchable, filterable list queries with role scoping.

pub mod fields;
pub mod plan;
pub mod sql;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::AppError;

pub use fields::{Caps, Field, FieldKind, FieldValue, Listable};
pub use plan::ListPlan;

pub const MAX_LIMIT: i64 = 100;

/// Raw list parameters as they arrive in the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    /// JSON object of field name to equality value, e.g. `{"gender":"Male"}`.
    pub filters: Option<String>,
    pub orderby_col: Option<String>,
    pub orderby_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Anything other than `asc` (any case) sorts descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("asc") => Direction::Asc,
            _ => Direction::Desc,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Validated list request, independent of the entity being listed.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub page: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub filters: Map<String, Value>,
    pub orderby_col: Option<String>,
    pub direction: Direction,
}

impl ListRequest {
    pub fn from_params(p: ListParams) -> Result<Self, AppError> {
        let page = p.page.unwrap_or(1);
        let limit = p.limit.unwrap_or(10);
        if page < 1 {
            return Err(AppError::Validation {
                message: "page must be at least 1".into(),
                details: json!({ "page": page }),
            });
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::Validation {
                message: format!("limit must be between 1 and {MAX_LIMIT}"),
                details: json!({ "limit": limit }),
            });
        }
        if (page - 1).checked_mul(limit).is_none() {
            return Err(AppError::Validation {
                message: "page is out of range".into(),
                details: json!({ "page": page, "limit": limit }),
            });
        }
        let filters = match p.filters.as_deref().map(str::trim) {
            None | Some("") => Map::new(),
            Some(raw) => parse_filters(raw)?,
        };
        let search = p
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(Self {
            page,
            limit,
            search,
            filters,
            orderby_col: p.orderby_col,
            direction: Direction::parse(p.orderby_dir.as_deref()),
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

pub fn parse_filters(raw: &str) -> Result<Map<String, Value>, AppError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::validation(
            "filters must be a JSON object of field to value",
        )),
        Err(e) => Err(AppError::Validation {
            message: "Invalid JSON in filters parameter".into(),
            details: json!({ "error": e.to_string() }),
        }),
    }
}

/// List response envelope.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
    pub count: usize,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, limit: i64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: page_count(total, limit),
            count: data.len(),
            data,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        let data: Vec<U> = self.data.into_iter().map(f).collect();
        Page {
            page: self.page,
            limit: self.limit,
            total: self.total,
            pages: self.pages,
            count: data.len(),
            data,
        }
    }
}

pub fn page_count(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: i64, limit: i64) -> ListParams {
        ListParams {
            page: Some(page),
            limit: Some(limit),
            ..Default::default()
        }
    }

    #[test]
    fn pagination_arithmetic() {
        assert_eq!(page_count(95, 10), 10);
        assert_eq!(page_count(100, 10), 10);
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(1, 100), 1);

        let req = ListRequest::from_params(params(10, 10)).unwrap();
        assert_eq!(req.offset(), 90);

        let page = Page::new(vec![91, 92, 93, 94, 95], 95, 10, 10);
        assert_eq!(page.pages, 10);
        assert_eq!(page.count, 5);
    }

    #[test]
    fn defaults_and_bounds() {
        let req = ListRequest::from_params(ListParams::default()).unwrap();
        assert_eq!((req.page, req.limit), (1, 10));
        assert_eq!(req.direction, Direction::Desc);

        assert!(ListRequest::from_params(params(0, 10)).is_err());
        assert!(ListRequest::from_params(params(1, 0)).is_err());
        assert!(ListRequest::from_params(params(1, 101)).is_err());
        assert!(ListRequest::from_params(params(1, 100)).is_ok());
    }

    #[test]
    fn page_whose_offset_overflows_is_rejected() {
        let err = ListRequest::from_params(params(i64::MAX, 10)).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(err.to_string(), "page is out of range");

        // Largest page whose offset still fits.
        let last = i64::MAX / 10 + 1;
        let req = ListRequest::from_params(params(last, 10)).unwrap();
        assert_eq!(req.offset(), (last - 1) * 10);
        assert!(ListRequest::from_params(params(last + 1, 10)).is_err());
    }

    #[test]
    fn malformed_filters_are_validation_errors() {
        let p = ListParams {
            filters: Some("{gender: Male".into()),
            ..Default::default()
        };
        let err = ListRequest::from_params(p).unwrap_err();
        assert_eq!(err.kind(), "ValidationError");

        let p = ListParams {
            filters: Some("[1,2]".into()),
            ..Default::default()
        };
        assert!(ListRequest::from_params(p).is_err());
    }

    #[test]
    fn blank_search_and_filters_are_absent() {
        let p = ListParams {
            search: Some("   ".into()),
            filters: Some(" ".into()),
            orderby_dir: Some("ASC".into()),
            ..Default::default()
        };
        let req = ListRequest::from_params(p).unwrap();
        assert_eq!(req.search, None);
        assert!(req.filters.is_empty());
        assert_eq!(req.direction, Direction::Asc);
    }
}
