// Query plans: the typed, store-independent description of a select

use super::filter::{Filter, SortKey};
use crate::domain::capability::IS_DELETED;
use crate::domain::{Entity, FieldDef};
use std::marker::PhantomData;

/// Inner join against a related table, optionally filtered on its columns
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: &'static str,
    /// Column of the queried entity
    pub local: &'static str,
    /// Column of the joined table
    pub foreign: &'static str,
    /// Predicate over the joined table's columns
    pub filter: Option<Filter>,
}

impl Join {
    pub fn new(table: &'static str, local: &'static str, foreign: &'static str) -> Self {
        Self {
            table,
            local,
            foreign,
            filter: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }
}

/// Whether loaded entities are tracked by the unit of work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tracking {
    /// Detached copies; a later update writes every column
    #[default]
    Snapshot,
    /// Attached with an original snapshot; a later update writes changed columns only
    Tracked,
}

/// Read flags shared by repository operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub tracking: Tracking,
    pub ignore_default_filters: bool,
}

impl ReadOptions {
    pub fn tracked() -> Self {
        Self {
            tracking: Tracking::Tracked,
            ..Self::default()
        }
    }

    /// Bypass the soft-delete exclusion
    pub fn including_deleted() -> Self {
        Self {
            ignore_default_filters: true,
            ..Self::default()
        }
    }

    pub fn with_tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = tracking;
        self
    }
}

/// Everything a store needs to execute a select
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectPlan {
    pub filter: Option<Filter>,
    pub joins: Vec<Join>,
    pub order: Vec<SortKey>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub distinct: bool,
    /// Selected columns; empty selects every schema field
    pub columns: Vec<FieldDef>,
}

/// Composable query over one entity type
#[derive(Debug, Clone)]
pub struct Query<T> {
    plan: SelectPlan,
    ignore_default_filters: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Query<T> {
    pub fn new() -> Self {
        Self {
            plan: SelectPlan::default(),
            ignore_default_filters: false,
            _entity: PhantomData,
        }
    }

    /// Add a predicate; successive calls are combined with AND
    pub fn filter(mut self, filter: Filter) -> Self {
        self.plan.filter = Some(match self.plan.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.plan.joins.push(join);
        self
    }

    /// Replace the ordering with a single primary key
    pub fn order_by(mut self, key: SortKey) -> Self {
        self.plan.order = vec![key];
        self
    }

    /// Append a tie-break key
    pub fn then_by(mut self, key: SortKey) -> Self {
        self.plan.order.push(key);
        self
    }

    pub fn skip(mut self, offset: i64) -> Self {
        self.plan.offset = Some(offset.max(0));
        self
    }

    pub fn take(mut self, limit: i64) -> Self {
        self.plan.limit = Some(limit.max(0));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.plan.distinct = true;
        self
    }

    pub fn select(mut self, columns: Vec<FieldDef>) -> Self {
        self.plan.columns = columns;
        self
    }

    pub fn ignore_default_filters(mut self) -> Self {
        self.ignore_default_filters = true;
        self
    }

    pub fn ignores_default_filters(&self) -> bool {
        self.ignore_default_filters
    }

    pub fn ordering(&self) -> &[SortKey] {
        &self.plan.order
    }

    /// Drop paging so the query describes the whole matching set
    pub fn unpaged(mut self) -> Self {
        self.plan.offset = None;
        self.plan.limit = None;
        self
    }

    /// The predicate applied by default: soft-deleted rows are excluded
    pub fn default_filter() -> Option<Filter> {
        T::SCHEMA
            .capabilities
            .deletable
            .then(|| IS_DELETED.eq(false))
    }

    /// Final plan with default filters folded in
    pub fn into_plan(self) -> SelectPlan {
        let mut plan = self.plan;
        if !self.ignore_default_filters {
            if let Some(default) = Self::default_filter() {
                plan.filter = Some(match plan.filter.take() {
                    Some(existing) => default.and(existing),
                    None => default,
                });
            }
        }
        plan
    }

    /// Plan as composed, without default filters
    pub fn plan(&self) -> &SelectPlan {
        &self.plan
    }
}
