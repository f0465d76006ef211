use sqlx::{Postgres, QueryBuilder};

use super::{FieldValue, ListPlan, Listable};

/// SQL source for a listable entity.
pub trait SqlListable: Listable {
    /// Projection, starting with `SELECT`.
    const SELECT: &'static str;
    /// `FROM` clause including any joins the fields refer to.
    const FROM: &'static str;
}

/// Escapes LIKE metacharacters so the search term matches literally.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

pub fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value.clone() {
        FieldValue::Null => {
            qb.push("NULL");
        }
        FieldValue::Uuid(v) => {
            qb.push_bind(v);
        }
        FieldValue::Text(v) => {
            qb.push_bind(v);
        }
        FieldValue::Int(v) => {
            qb.push_bind(v);
        }
        FieldValue::Float(v) => {
            qb.push_bind(v);
        }
        FieldValue::Bool(v) => {
            qb.push_bind(v);
        }
        FieldValue::Timestamp(v) => {
            qb.push_bind(v);
        }
        FieldValue::Date(v) => {
            qb.push_bind(v);
        }
        FieldValue::Role(v) => {
            qb.push_bind(v);
        }
        FieldValue::Verdict(v) => {
            qb.push_bind(v);
        }
    }
}

impl<T: SqlListable> ListPlan<T> {
    /// Appends ` WHERE ...` with scope first, then search, then filters.
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE TRUE");
        if let Some((field, id)) = self.scope {
            qb.push(" AND ").push(field.column).push(" = ");
            qb.push_bind(id);
        }
        if let Some(term) = &self.search {
            let pattern = like_pattern(term);
            qb.push(" AND (");
            for (i, field) in self.search_fields().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(field.column).push(" ILIKE ");
                qb.push_bind(pattern.clone());
            }
            qb.push(")");
        }
        for (field, value) in &self.filters {
            qb.push(" AND ").push(field.column);
            if *value == FieldValue::Null {
                qb.push(" IS NULL");
            } else {
                qb.push(" = ");
                push_value(qb, value);
            }
        }
    }

    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) ");
        qb.push(T::FROM);
        self.push_where(&mut qb);
        qb
    }

    pub fn page_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(T::SELECT);
        qb.push(" ").push(T::FROM);
        self.push_where(&mut qb);
        let (field, dir) = self.order;
        qb.push(" ORDER BY ")
            .push(field.column)
            .push(" ")
            .push(dir.sql());
        if !std::ptr::eq(field, self.key) {
            qb.push(", ").push(self.key.column).push(" ASC");
        }
        qb.push(" LIMIT ");
        qb.push_bind(self.limit);
        qb.push(" OFFSET ");
        qb.push_bind(self.offset());
        qb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ListParams, ListRequest};
    use crate::results::repo_types::ResultView;
    use uuid::Uuid;

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(like_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
        assert_eq!(like_pattern("male"), "%male%");
    }

    #[test]
    fn scope_precedes_user_predicates() {
        let req = ListRequest::from_params(ListParams {
            search: Some("smith".into()),
            filters: Some(r#"{"gender":"Female","bogus":1}"#.into()),
            orderby_col: Some("age".into()),
            orderby_dir: Some("asc".into()),
            ..Default::default()
        })
        .unwrap();
        let plan = ListPlan::<ResultView>::build(&req, Some(("user_id", Uuid::new_v4()))).unwrap();
        let sql = plan.page_query().sql().to_string();

        let scope = sql.find("r.user_id = $1").expect("scope predicate");
        let search = sql.find("u.email ILIKE $2").expect("search predicate");
        let filter = sql.find("r.gender = $5").expect("filter predicate");
        assert!(scope < search && search < filter, "{sql}");
        assert!(sql.contains("ORDER BY r.age ASC, r.id ASC LIMIT $6 OFFSET $7"), "{sql}");
        assert!(!sql.contains("bogus"));
    }

    #[test]
    fn ordering_always_ends_on_the_key() {
        let by = |col: &str| {
            let req = ListRequest::from_params(ListParams {
                orderby_col: Some(col.into()),
                ..Default::default()
            })
            .unwrap();
            let plan = ListPlan::<ResultView>::build(&req, None).unwrap();
            plan.page_query().sql().to_string()
        };
        assert!(by("gender").contains("ORDER BY r.gender DESC, r.id ASC LIMIT"));
        assert!(by("id").contains("ORDER BY r.id DESC LIMIT"));
    }

    #[test]
    fn count_uses_same_predicates_without_paging() {
        let req = ListRequest::from_params(ListParams {
            filters: Some(r#"{"result":null}"#.into()),
            ..Default::default()
        })
        .unwrap();
        let plan = ListPlan::<ResultView>::build(&req, None).unwrap();
        let sql = plan.count_query().sql().to_string();
        assert!(sql.starts_with("SELECT COUNT(*) FROM results r JOIN users u"), "{sql}");
        assert!(sql.contains("r.result IS NULL"));
        assert!(!sql.contains("LIMIT"));
    }
}
