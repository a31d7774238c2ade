// SQL rendering for select plans, filters and writes
//
// Identifiers come from static schemas and are always quoted; every value is
// bound. The queried table is aliased `t`, joined tables `j0`, `j1`, ...

use sqlx::{QueryBuilder, Sqlite};
use strata_core::domain::{FieldDef, Record, Schema, Value};
use strata_core::query::{Assignment, CompareOp, Direction, Filter, SelectPlan};

const BASE_ALIAS: &str = "t";

/// How much of a plan a rendered select carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Columns, ordering and paging
    Rows,
    /// Paging kept, ordering dropped (existence probes)
    Probe,
    /// Neither ordering nor paging (counts)
    Unpaged,
}

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column(alias: Option<&str>, name: &str) -> String {
    match alias {
        Some(alias) => format!("{}.{}", alias, quote(name)),
        None => quote(name),
    }
}

pub fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Null => builder.push_bind(None::<i64>),
        Value::Bool(b) => builder.push_bind(*b),
        Value::Integer(i) => builder.push_bind(*i),
        Value::Real(f) => builder.push_bind(*f),
        Value::Text(s) => builder.push_bind(s.clone()),
    };
}

/// Render `filter` with columns qualified by `alias` (bare when `None`)
pub fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter, alias: Option<&str>) {
    match filter {
        Filter::Compare { field, op, value } => {
            builder.push(column(alias, field));
            match (op, value) {
                (CompareOp::Eq, Value::Null) => {
                    builder.push(" IS NULL");
                }
                (CompareOp::Ne, Value::Null) => {
                    builder.push(" IS NOT NULL");
                }
                (op, value) => {
                    builder.push(format!(" {} ", op.symbol()));
                    push_value(builder, value);
                }
            }
        }
        Filter::In { field, values } => {
            if values.is_empty() {
                builder.push("0 = 1");
                return;
            }
            builder.push(column(alias, field));
            builder.push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(builder, value);
            }
            builder.push(")");
        }
        Filter::IsNull(field) => {
            builder.push(column(alias, field));
            builder.push(" IS NULL");
        }
        Filter::IsNotNull(field) => {
            builder.push(column(alias, field));
            builder.push(" IS NOT NULL");
        }
        Filter::Like { field, pattern } => {
            builder.push(column(alias, field));
            builder.push(" LIKE ");
            builder.push_bind(pattern.clone());
        }
        Filter::And(parts) => push_junction(builder, parts, " AND ", "1 = 1", alias),
        Filter::Or(parts) => push_junction(builder, parts, " OR ", "0 = 1", alias),
        Filter::Not(inner) => {
            builder.push("NOT (");
            push_filter(builder, inner, alias);
            builder.push(")");
        }
    }
}

fn push_junction(
    builder: &mut QueryBuilder<'_, Sqlite>,
    parts: &[Filter],
    separator: &str,
    empty: &str,
    alias: Option<&str>,
) {
    if parts.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            builder.push(separator);
        }
        push_filter(builder, part, alias);
    }
    builder.push(")");
}

/// Columns a select returns: the plan's projection or every schema field
pub fn selected_columns<'a>(schema: &'a Schema, plan: &'a SelectPlan) -> &'a [FieldDef] {
    if plan.columns.is_empty() {
        schema.fields
    } else {
        &plan.columns
    }
}

pub fn push_select(
    builder: &mut QueryBuilder<'_, Sqlite>,
    schema: &Schema,
    plan: &SelectPlan,
    mode: SelectMode,
) {
    builder.push("SELECT ");
    if plan.distinct {
        builder.push("DISTINCT ");
    }
    for (i, field) in selected_columns(schema, plan).iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(format!(
            "{} AS {}",
            column(Some(BASE_ALIAS), field.name),
            quote(field.name)
        ));
    }
    builder.push(format!(" FROM {} AS {}", quote(schema.table), BASE_ALIAS));

    for (index, join) in plan.joins.iter().enumerate() {
        let alias = format!("j{}", index);
        builder.push(format!(
            " INNER JOIN {} AS {} ON {} = {}",
            quote(join.table),
            alias,
            column(Some(&alias), join.foreign),
            column(Some(BASE_ALIAS), join.local)
        ));
        if let Some(filter) = &join.filter {
            builder.push(" AND ");
            push_filter(builder, filter, Some(&alias));
        }
    }

    if let Some(filter) = plan.filter.as_ref().filter(|f| !f.is_trivial()) {
        builder.push(" WHERE ");
        push_filter(builder, filter, Some(BASE_ALIAS));
    }

    if mode == SelectMode::Rows && !plan.order.is_empty() {
        builder.push(" ORDER BY ");
        for (i, key) in plan.order.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(column(Some(BASE_ALIAS), key.field));
            builder.push(match key.direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
        }
        // Key tie-break keeps paging stable across equal sort values
        if !plan.order.iter().any(|key| key.field == schema.key.name) {
            builder.push(format!(", {} ASC", column(Some(BASE_ALIAS), schema.key.name)));
        }
    }

    if mode != SelectMode::Unpaged {
        match (plan.limit, plan.offset) {
            (Some(limit), offset) => {
                builder.push(" LIMIT ");
                builder.push_bind(limit);
                if let Some(offset) = offset {
                    builder.push(" OFFSET ");
                    builder.push_bind(offset);
                }
            }
            (None, Some(offset)) => {
                builder.push(" LIMIT -1 OFFSET ");
                builder.push_bind(offset);
            }
            (None, None) => {}
        }
    }
}

pub fn count_query<'a>(schema: &Schema, plan: &SelectPlan) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM (");
    push_select(&mut builder, schema, plan, SelectMode::Unpaged);
    builder.push(")");
    builder
}

pub fn exists_query<'a>(schema: &Schema, plan: &SelectPlan) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new("SELECT EXISTS(");
    push_select(&mut builder, schema, plan, SelectMode::Probe);
    builder.push(")");
    builder
}

pub fn select_query<'a>(schema: &Schema, plan: &SelectPlan) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new("");
    push_select(&mut builder, schema, plan, SelectMode::Rows);
    builder
}

pub fn insert_query<'a>(schema: &Schema, values: &Record) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!("INSERT INTO {} (", quote(schema.table)));
    for (i, name) in values.names().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(quote(name));
    }
    builder.push(") VALUES (");
    for (i, (_, value)) in values.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        push_value(&mut builder, value);
    }
    builder.push(")");
    builder
}

fn push_assignments<'a, 'n, 'v>(
    builder: &mut QueryBuilder<'a, Sqlite>,
    pairs: impl Iterator<Item = (&'n str, &'v Value)>,
) {
    for (i, (name, value)) in pairs.enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(quote(name));
        builder.push(" = ");
        push_value(builder, value);
    }
}

/// `UPDATE ... SET ... WHERE key = ?`; `values` must not be empty
pub fn update_query<'a>(schema: &Schema, key: &Value, values: &Record) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", quote(schema.table)));
    push_assignments(&mut builder, values.iter());
    builder.push(format!(" WHERE {} = ", quote(schema.key.name)));
    push_value(&mut builder, key);
    builder
}

pub fn delete_query<'a>(schema: &Schema, key: &Value) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!(
        "DELETE FROM {} WHERE {} = ",
        quote(schema.table),
        quote(schema.key.name)
    ));
    push_value(&mut builder, key);
    builder
}

pub fn update_where_query<'a>(
    schema: &Schema,
    filter: &Filter,
    assignments: &[Assignment],
) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!("UPDATE {} SET ", quote(schema.table)));
    push_assignments(
        &mut builder,
        assignments.iter().map(|a| (a.field, &a.value)),
    );
    if !filter.is_trivial() {
        builder.push(" WHERE ");
        push_filter(&mut builder, filter, None);
    }
    builder
}

pub fn delete_where_query<'a>(schema: &Schema, filter: &Filter) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(format!("DELETE FROM {}", quote(schema.table)));
    if !filter.is_trivial() {
        builder.push(" WHERE ");
        push_filter(&mut builder, filter, None);
    }
    builder
}
