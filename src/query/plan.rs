use std::cmp::Ordering;

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::{Direction, Field, FieldValue, ListRequest, Listable};
use crate::error::AppError;

/// A list request resolved against one entity's field allow-list.
///
/// Predicates are kept in application order: scope, then search, then filters.
/// The same plan drives both the SQL renderer and in-memory evaluation.
pub struct ListPlan<T: 'static> {
    pub scope: Option<(&'static Field<T>, Uuid)>,
    pub search: Option<String>,
    pub filters: Vec<(&'static Field<T>, FieldValue)>,
    pub order: (&'static Field<T>, Direction),
    /// Ascending tiebreaker after `order`.
    pub key: &'static Field<T>,
    pub page: i64,
    pub limit: i64,
}

impl<T: Listable> ListPlan<T> {
    pub fn build(req: &ListRequest, scope: Option<(&'static str, Uuid)>) -> Result<Self, AppError> {
        let scope = match scope {
            Some((name, id)) => {
                let field = T::field(name).ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("scope field `{name}` is not declared"))
                })?;
                Some((field, id))
            }
            None => None,
        };

        let mut filters = Vec::with_capacity(req.filters.len());
        for (key, raw) in &req.filters {
            let Some(field) = T::field(key).filter(|f| f.caps.filter) else {
                debug!(entity = ?T::KIND, key = %key, "ignoring unknown filter key");
                continue;
            };
            let value = field.convert(raw).map_err(|e| AppError::Validation {
                message: e.to_string(),
                details: json!({ "field": key }),
            })?;
            filters.push((field, value));
        }

        let order_field = req
            .orderby_col
            .as_deref()
            .and_then(T::field)
            .filter(|f| f.caps.sort);
        let order = match order_field {
            Some(f) => (f, req.direction),
            None => {
                let f = T::field(T::DEFAULT_ORDER).ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!(
                        "default order field `{}` is not declared",
                        T::DEFAULT_ORDER
                    ))
                })?;
                (f, Direction::Desc)
            }
        };

        let key = T::field(T::KEY).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("key field `{}` is not declared", T::KEY))
        })?;

        Ok(Self {
            scope,
            search: req.search.clone(),
            filters,
            order,
            key,
            page: req.page,
            limit: req.limit,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn search_fields(&self) -> impl Iterator<Item = &'static Field<T>> {
        T::fields().iter().filter(|f| f.caps.search)
    }

    /// Evaluates scope, search and filters against one record.
    pub fn matches(&self, row: &T) -> bool {
        if let Some((field, id)) = self.scope {
            if (field.get)(row) != FieldValue::Uuid(id) {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let needle = term.to_lowercase();
            let hit = self.search_fields().any(|f| {
                (f.get)(row)
                    .as_text()
                    .map(|s| s.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            });
            if !hit {
                return false;
            }
        }
        self.filters
            .iter()
            .all(|(field, value)| (field.get)(row) == *value)
    }

    /// Sort order for in-memory evaluation. Descending reverses the ordering
    /// column only, so nulls come first, as in PostgreSQL. Ties fall back to
    /// the key ascending.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        let (field, dir) = self.order;
        let ord = (field.get)(a).cmp_for_sort(&(field.get)(b));
        let ord = match dir {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        ord.then_with(|| (self.key.get)(a).cmp_for_sort(&(self.key.get)(b)))
    }

    /// Applies the plan to a full row set: returns the requested page and the
    /// number of rows matching before pagination.
    pub fn apply(&self, rows: impl IntoIterator<Item = T>) -> (Vec<T>, i64) {
        let mut hits: Vec<T> = rows.into_iter().filter(|r| self.matches(r)).collect();
        hits.sort_by(|a, b| self.compare(a, b));
        let total = hits.len() as i64;
        let page = hits
            .into_iter()
            .skip(self.offset().max(0) as usize)
            .take(self.limit.max(0) as usize)
            .collect();
        (page, total)
    }
}
