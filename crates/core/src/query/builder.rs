// Query Builder - turns a base query plus a filter request into paged queries
//
// Pure logic: nothing here touches a store. The repository executes the
// queries this module produces.

use super::filter::{Direction, SortKey};
use super::plan::Query;
use super::request::{FilterRequest, PageWindow};
use crate::domain::capability::MODIFIED_ON;
use crate::domain::{resolve_field, Entity, FieldDef};

/// Caller-supplied query rewrite (include/join or predicate)
pub type Transform<'a, T> = Box<dyn FnOnce(Query<T>) -> Query<T> + Send + 'a>;

/// Queries derived from one filter request
#[derive(Debug, Clone)]
pub struct FilterQuery<T> {
    /// Filtered, ordered and paged
    pub paged: Query<T>,
    /// Filtered and ordered, no paging (for the total count)
    pub matching: Query<T>,
    /// One-row slice of the base set starting at the probe offset
    pub probe: Query<T>,
    /// Resolved `select` fields; empty means the full shape
    pub projection: Vec<FieldDef>,
    pub window: PageWindow,
}

/// Build the paged, counting and probing queries for `request`.
///
/// `include` runs before `predicate`. With `distinct_ordering` the ordered
/// sequence is de-duplicated whenever a sort key resolves, which removes rows
/// repeated by join-based includes.
pub fn build_filter_query<T: Entity>(
    base: Query<T>,
    include: Option<Transform<'_, T>>,
    predicate: Option<Transform<'_, T>>,
    request: &FilterRequest,
    distinct_ordering: bool,
) -> FilterQuery<T> {
    let window = request.window();
    let probe = base.clone().skip(window.probe_offset).take(1);

    let mut query = base;
    if let Some(include) = include {
        query = include(query);
    }
    if let Some(predicate) = predicate {
        query = predicate(query);
    }

    query = apply_date_range(query, request);

    let keys = resolve_ordering(T::SCHEMA.fields, &request.order_by);
    if keys.is_empty() {
        if T::SCHEMA.capabilities.modifiable {
            query = query.order_by(MODIFIED_ON.desc());
        }
    } else {
        let mut keys = keys.into_iter();
        if let Some(primary) = keys.next() {
            query = query.order_by(primary);
        }
        for key in keys {
            query = query.then_by(key);
        }
        if distinct_ordering {
            query = query.distinct();
        }
    }

    let matching = query.clone().unpaged();
    let paged = query.skip(window.skip).take(window.take);

    FilterQuery {
        paged,
        matching,
        probe,
        projection: resolve_projection(T::SCHEMA.fields, &request.select),
        window,
    }
}

/// `ModifiedOn` bounds, for modifiable entities only
fn apply_date_range<T: Entity>(mut query: Query<T>, request: &FilterRequest) -> Query<T> {
    if !T::SCHEMA.capabilities.modifiable {
        return query;
    }
    if request.from_date != 0 {
        query = query.filter(MODIFIED_ON.ge(request.from_date));
    }
    if request.to_date > 0 {
        query = query.filter(MODIFIED_ON.le(request.to_date));
    }
    query
}

/// Resolve `"<field>[ desc]"` tokens in listed order, skipping unknown fields
pub fn resolve_ordering(fields: &'static [FieldDef], tokens: &[String]) -> Vec<SortKey> {
    tokens
        .iter()
        .filter_map(|token| {
            let mut words = token.split_whitespace();
            let name = words.next()?;
            let direction = match words.last() {
                Some(suffix) if suffix.eq_ignore_ascii_case("desc") => Direction::Desc,
                _ => Direction::Asc,
            };
            resolve_field(fields, name).map(|field| SortKey {
                field: field.name,
                direction,
            })
        })
        .collect()
}

/// Resolve `select` names, dropping unknown entries and duplicates
pub fn resolve_projection(fields: &'static [FieldDef], names: &[String]) -> Vec<FieldDef> {
    let mut resolved: Vec<FieldDef> = Vec::new();
    for field in names.iter().filter_map(|name| resolve_field(fields, name)) {
        if !resolved.contains(field) {
            resolved.push(*field);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Article, Label};
    use crate::query::filter::Filter;
    use crate::query::plan::Join;

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_ordering_directions_and_unknown_fields() {
        let keys = resolve_ordering(
            Article::SCHEMA.fields,
            &tokens(&["title desc", "nope", "LabelId", "id DESC", "  "]),
        );

        assert_eq!(
            keys,
            vec![
                Article::TITLE.desc(),
                Article::LABEL_ID.asc(),
                Article::ID.desc()
            ]
        );
    }

    #[test]
    fn test_resolve_projection_drops_unknown_and_duplicates() {
        let fields = resolve_projection(
            Article::SCHEMA.fields,
            &tokens(&["Title", "bogus", "title", "id"]),
        );
        assert_eq!(fields, vec![Article::TITLE, Article::ID]);

        let none = resolve_projection(Article::SCHEMA.fields, &tokens(&["bogus"]));
        assert!(none.is_empty());
    }

    #[test]
    fn test_empty_order_falls_back_to_modified_on_desc() {
        let built = build_filter_query(
            Query::<Article>::new(),
            None,
            None,
            &FilterRequest::new(1, 10),
            false,
        );
        assert_eq!(built.paged.ordering(), &[MODIFIED_ON.desc()]);
    }

    #[test]
    fn test_unresolvable_order_falls_back_too() {
        let request = FilterRequest::new(1, 10).order_by(["ghost desc"]);
        let built = build_filter_query(Query::<Article>::new(), None, None, &request, false);
        assert_eq!(built.paged.ordering(), &[MODIFIED_ON.desc()]);
    }

    #[test]
    fn test_non_modifiable_entity_has_no_fallback_order() {
        let built = build_filter_query(
            Query::<Label>::new(),
            None,
            None,
            &FilterRequest::new(1, 10).between(5, 10),
            false,
        );

        assert!(built.paged.ordering().is_empty());
        assert_eq!(built.paged.plan().filter, None);
    }

    #[test]
    fn test_date_range_applies_only_to_set_bounds() {
        let request = FilterRequest::new(1, 10).between(100, 0);
        let built = build_filter_query(Query::<Article>::new(), None, None, &request, false);
        assert_eq!(built.paged.plan().filter, Some(MODIFIED_ON.ge(100)));

        let request = FilterRequest::new(1, 10).between(0, 200);
        let built = build_filter_query(Query::<Article>::new(), None, None, &request, false);
        assert_eq!(built.paged.plan().filter, Some(MODIFIED_ON.le(200)));

        let request = FilterRequest::new(1, 10).between(-1, 200);
        let built = build_filter_query(Query::<Article>::new(), None, None, &request, false);
        assert_eq!(
            built.paged.plan().filter,
            Some(MODIFIED_ON.ge(-1).and(MODIFIED_ON.le(200)))
        );
    }

    #[test]
    fn test_include_runs_before_predicate() {
        let include: Transform<'_, Article> = Box::new(|q| q.filter(Article::TITLE.eq("first")));
        let predicate: Transform<'_, Article> = Box::new(|q| q.filter(Article::ID.gt(1)));

        let built = build_filter_query(
            Query::<Article>::new(),
            Some(include),
            Some(predicate),
            &FilterRequest::new(1, 10),
            false,
        );

        assert_eq!(
            built.paged.plan().filter,
            Some(Filter::And(vec![Article::TITLE.eq("first"), Article::ID.gt(1)]))
        );
    }

    #[test]
    fn test_paging_and_probe_windows() {
        let predicate: Transform<'_, Article> = Box::new(|q| q.filter(Article::ID.gt(3)));
        let built = build_filter_query(
            Query::<Article>::new(),
            None,
            Some(predicate),
            &FilterRequest::new(2, 10),
            false,
        );

        assert_eq!(built.paged.plan().offset, Some(10));
        assert_eq!(built.paged.plan().limit, Some(10));
        assert_eq!(built.matching.plan().offset, None);
        assert_eq!(built.matching.plan().limit, None);

        // The probe ignores the caller's predicate but keeps base paging one page ahead
        assert_eq!(built.probe.plan().filter, None);
        assert_eq!(built.probe.plan().offset, Some(30));
        assert_eq!(built.probe.plan().limit, Some(1));
    }

    #[test]
    fn test_distinct_only_when_a_key_resolves() {
        let include: Transform<'_, Article> =
            Box::new(|q| q.join(Join::new("labels", "label_id", "id")));
        let request = FilterRequest::new(1, 10).order_by(["title", "id desc"]);
        let built = build_filter_query(Query::<Article>::new(), Some(include), None, &request, true);
        assert!(built.paged.plan().distinct);
        assert_eq!(
            built.paged.ordering(),
            &[Article::TITLE.asc(), Article::ID.desc()]
        );

        let built = build_filter_query(
            Query::<Article>::new(),
            None,
            None,
            &FilterRequest::new(1, 10),
            true,
        );
        assert!(!built.paged.plan().distinct);
    }
}
