// Generic Repository - reads, staged writes and set-based writes for one entity type
//
// Every repository created by a unit of work shares its session. Staged
// writes only reach the store when the unit of work saves; set-based writes
// execute immediately and bypass audit stamping.

use super::change_tracker::{ChangeKind, Entry};
use super::session::SharedSession;
use crate::domain::{Entity, Record, Shape};
use crate::error::{AppError, Result};
use crate::query::{
    build_filter_query, resolve_projection, Assignment, Filter, FilterRequest, Join, Query,
    ReadOptions, SelectPlan, Tracking, Transform,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One row of a filtered page: the full shape, or only the selected fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row<T> {
    Item(T),
    Projected(Record),
}

impl<T> Row<T> {
    pub fn into_item(self) -> Option<T> {
        match self {
            Row::Item(item) => Some(item),
            Row::Projected(_) => None,
        }
    }

    pub fn as_projected(&self) -> Option<&Record> {
        match self {
            Row::Item(_) => None,
            Row::Projected(record) => Some(record),
        }
    }
}

/// Result of a filter-request read
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredData<T> {
    pub rows: Vec<Row<T>>,
    /// Rows matching the request's filters, before paging
    pub total_count: i64,
    pub has_next_page: bool,
    pub page: i32,
    pub length: i32,
}

impl<T> FilteredData<T> {
    /// Full-shape rows; empty when the request selected fields
    pub fn into_items(self) -> Vec<T> {
        self.rows.into_iter().filter_map(Row::into_item).collect()
    }
}

type GroupKeyFn<T, K> = Box<dyn Fn(&T) -> K + Send + Sync>;
type GroupSelectFn<T, K, R> = Box<dyn Fn(&K, &[T]) -> R + Send + Sync>;
type GroupOrderFn<R> = Box<dyn Fn(&R, &R) -> Ordering + Send + Sync>;

/// In-memory grouping over the rows matching `predicate`.
///
/// `group_by` and `select` are required.
pub struct Grouping<T, K, R> {
    predicate: Option<Filter>,
    group_by: Option<GroupKeyFn<T, K>>,
    select: Option<GroupSelectFn<T, K, R>>,
    order_by: Option<GroupOrderFn<R>>,
    take: Option<usize>,
    options: ReadOptions,
}

impl<T, K, R> Default for Grouping<T, K, R> {
    fn default() -> Self {
        Self {
            predicate: None,
            group_by: None,
            select: None,
            order_by: None,
            take: None,
            options: ReadOptions::default(),
        }
    }
}

impl<T, K, R> Grouping<T, K, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Filter) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn group_by(mut self, key: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        self.group_by = Some(Box::new(key));
        self
    }

    pub fn select(mut self, projector: impl Fn(&K, &[T]) -> R + Send + Sync + 'static) -> Self {
        self.select = Some(Box::new(projector));
        self
    }

    pub fn order_by(mut self, compare: impl Fn(&R, &R) -> Ordering + Send + Sync + 'static) -> Self {
        self.order_by = Some(Box::new(compare));
        self
    }

    pub fn take(mut self, limit: usize) -> Self {
        self.take = Some(limit);
        self
    }

    pub fn options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }
}

/// Repository over one entity type
pub struct Repository<T> {
    session: SharedSession,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(session: SharedSession) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    /// Fresh query over `T`, default filters included
    pub fn query(&self) -> Query<T> {
        Query::new()
    }

    fn scoped(query: Query<T>, options: ReadOptions) -> SelectPlan {
        if options.ignore_default_filters {
            query.ignore_default_filters().into_plan()
        } else {
            query.into_plan()
        }
    }

    async fn load(&self, plan: SelectPlan, tracking: Tracking) -> Result<Vec<T>> {
        let schema = T::SCHEMA;
        let mut session = self.session.lock().await;
        let records = session.store()?.fetch(&schema, &plan).await?;
        let entities = records
            .iter()
            .map(T::from_record)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if tracking == Tracking::Tracked {
            let tracker = session.tracker()?;
            for entity in &entities {
                tracker.remember(schema.table, entity.id().into(), entity.to_record());
            }
        }

        debug!(table = schema.table, rows = entities.len(), tracking = ?tracking, "Rows loaded");
        Ok(entities)
    }

    /// Entity with the given key, honoring default filters
    pub async fn get(&self, id: T::Id) -> Result<Option<T>> {
        let query = self.query().filter(T::SCHEMA.key.eq(id)).take(1);
        Ok(self
            .load(query.into_plan(), Tracking::Snapshot)
            .await?
            .into_iter()
            .next())
    }

    /// First entity matching the query, if any
    pub async fn get_single(&self, query: Query<T>, options: ReadOptions) -> Result<Option<T>> {
        let plan = Self::scoped(query.take(1), options);
        Ok(self.load(plan, options.tracking).await?.into_iter().next())
    }

    pub async fn get_single_projected<D: From<T>>(
        &self,
        query: Query<T>,
        options: ReadOptions,
    ) -> Result<Option<D>> {
        Ok(self.get_single(query, options).await?.map(D::from))
    }

    /// Every entity matching the query, in the query's order
    pub async fn get_data(&self, query: Query<T>, options: ReadOptions) -> Result<Vec<T>> {
        self.load(Self::scoped(query, options), options.tracking)
            .await
    }

    /// `get_data` followed by an in-memory selector
    pub async fn get_data_with<R, F>(
        &self,
        query: Query<T>,
        options: ReadOptions,
        selector: F,
    ) -> Result<Vec<R>>
    where
        F: Fn(T) -> R + Send,
    {
        Ok(self
            .get_data(query, options)
            .await?
            .into_iter()
            .map(selector)
            .collect())
    }

    pub async fn get_projected<D: From<T>>(
        &self,
        query: Query<T>,
        options: ReadOptions,
    ) -> Result<Vec<D>> {
        self.get_data_with(query, options, D::from).await
    }

    /// Entities joined to a related table, de-duplicated
    pub async fn get_children(
        &self,
        join: Join,
        predicate: Option<Filter>,
        options: ReadOptions,
    ) -> Result<Vec<T>> {
        let mut query = self.query().join(join).distinct();
        if let Some(predicate) = predicate {
            query = query.filter(predicate);
        }
        self.get_data(query, options).await
    }

    /// Group matching entities by key and project each group
    pub async fn get_grouped<K, R>(&self, grouping: Grouping<T, K, R>) -> Result<Vec<R>>
    where
        K: Ord + Send,
        R: Send,
    {
        let Grouping {
            predicate,
            group_by,
            select,
            order_by,
            take,
            options,
        } = grouping;

        let Some(group_by) = group_by else {
            return Err(AppError::InvalidArgument(
                "grouping requires a group key function".to_string(),
            ));
        };
        let Some(select) = select else {
            return Err(AppError::InvalidArgument(
                "grouping requires a group projection".to_string(),
            ));
        };

        let mut query = self.query();
        if let Some(predicate) = predicate {
            query = query.filter(predicate);
        }
        let entities = self.get_data(query, options).await?;

        let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
        for entity in entities {
            groups.entry(group_by(&entity)).or_default().push(entity);
        }

        let mut results: Vec<R> = groups
            .iter()
            .map(|(key, members)| select(key, members))
            .collect();
        if let Some(compare) = order_by {
            results.sort_by(|a, b| compare(a, b));
        }
        if let Some(limit) = take {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn count_plan(&self, plan: SelectPlan) -> Result<i64> {
        let schema = T::SCHEMA;
        let mut session = self.session.lock().await;
        session.store()?.count(&schema, &plan).await
    }

    async fn exists_plan(&self, plan: SelectPlan) -> Result<bool> {
        let schema = T::SCHEMA;
        let mut session = self.session.lock().await;
        session.store()?.exists(&schema, &plan).await
    }

    pub async fn count(&self) -> Result<i64> {
        self.count_plan(self.query().into_plan()).await
    }

    pub async fn count_where(&self, predicate: Filter) -> Result<i64> {
        self.count_plan(self.query().filter(predicate).into_plan())
            .await
    }

    pub async fn is_exist(&self, predicate: Filter) -> Result<bool> {
        self.exists_plan(self.query().filter(predicate).into_plan())
            .await
    }

    /// Existence check with an optional predicate
    pub async fn any_exist(
        &self,
        predicate: Option<Filter>,
        ignore_default_filters: bool,
    ) -> Result<bool> {
        let mut query = self.query();
        if let Some(predicate) = predicate {
            query = query.filter(predicate);
        }
        if ignore_default_filters {
            query = query.ignore_default_filters();
        }
        self.exists_plan(query.into_plan()).await
    }

    /// Page of entities for a filter request
    pub async fn filter_data(
        &self,
        request: &FilterRequest,
        predicate: Option<Transform<'_, T>>,
    ) -> Result<FilteredData<T>> {
        self.filter_data_with_includes(request, None, predicate)
            .await
    }

    /// Page of entities for a filter request, with joins applied before the predicate
    pub async fn filter_data_with_includes(
        &self,
        request: &FilterRequest,
        include: Option<Transform<'_, T>>,
        predicate: Option<Transform<'_, T>>,
    ) -> Result<FilteredData<T>> {
        let schema = T::SCHEMA;
        let built = build_filter_query(self.query(), include, predicate, request, false);
        let projected = !built.projection.is_empty();
        let paged_plan = built.paged.select(built.projection).into_plan();
        let matching_plan = built.matching.into_plan();
        let probe_plan = built.probe.into_plan();

        let mut session = self.session.lock().await;
        let store = session.store()?;
        let records = store.fetch(&schema, &paged_plan).await?;
        let total_count = store.count(&schema, &matching_plan).await?;
        let has_next_page = store.exists(&schema, &probe_plan).await?;
        drop(session);

        let rows = if projected {
            records.into_iter().map(Row::Projected).collect()
        } else {
            records
                .iter()
                .map(|record| T::from_record(record).map(Row::Item))
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        debug!(
            table = schema.table,
            page = built.window.page,
            length = built.window.length,
            total_count = total_count,
            has_next_page = has_next_page,
            "Filter request served"
        );

        Ok(FilteredData {
            rows,
            total_count,
            has_next_page,
            page: built.window.page,
            length: built.window.length,
        })
    }

    /// Page of DTOs for a filter request plus the total matching count.
    ///
    /// `select` resolves against the DTO's fields; resolved ordering makes the
    /// ordered sequence distinct before paging, collapsing rows repeated by
    /// the `include` joins.
    pub async fn filter_projected<D>(
        &self,
        request: &FilterRequest,
        include: Option<Transform<'_, T>>,
        predicate: Option<Transform<'_, T>>,
    ) -> Result<(Vec<Row<D>>, i64)>
    where
        D: From<T> + Shape + Send,
    {
        let schema = T::SCHEMA;
        let built = build_filter_query(self.query(), include, predicate, request, true);
        let paged_plan = built.paged.into_plan();
        let matching_plan = built.matching.into_plan();

        let mut session = self.session.lock().await;
        let store = session.store()?;
        let records = store.fetch(&schema, &paged_plan).await?;
        let total_count = store.count(&schema, &matching_plan).await?;
        drop(session);

        let names: Vec<&'static str> = resolve_projection(D::FIELDS, &request.select)
            .iter()
            .map(|field| field.name)
            .collect();

        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            let dto = D::from(T::from_record(record)?);
            rows.push(if names.is_empty() {
                Row::Item(dto)
            } else {
                Row::Projected(dto.to_record().project(&names))
            });
        }
        Ok((rows, total_count))
    }

    async fn stage(&self, kind: ChangeKind, entities: Vec<T>) -> Result<Vec<Entry<T>>> {
        let mut session = self.session.lock().await;
        let tracker = session.tracker()?;
        let entries: Vec<Entry<T>> = entities
            .into_iter()
            .map(|entity| tracker.stage(kind, entity))
            .collect();
        debug!(table = T::SCHEMA.table, kind = ?kind, count = entries.len(), "Changes staged");
        Ok(entries)
    }

    async fn stage_one(&self, kind: ChangeKind, entity: T) -> Result<Entry<T>> {
        let mut session = self.session.lock().await;
        Ok(session.tracker()?.stage(kind, entity))
    }

    /// Stage an insert; the key and audit stamps are filled in on save
    pub async fn insert(&self, entity: T) -> Result<Entry<T>> {
        self.stage_one(ChangeKind::Added, entity).await
    }

    pub async fn insert_many(&self, entities: Vec<T>) -> Result<Vec<Entry<T>>> {
        self.stage(ChangeKind::Added, entities).await
    }

    /// Stage an update; attached entities write changed columns only
    pub async fn update(&self, entity: T) -> Result<Entry<T>> {
        self.stage_one(ChangeKind::Modified, entity).await
    }

    pub async fn update_many(&self, entities: Vec<T>) -> Result<Vec<Entry<T>>> {
        self.stage(ChangeKind::Modified, entities).await
    }

    /// Stage a delete; deletable entities are soft-deleted on save
    pub async fn delete(&self, entity: T) -> Result<Entry<T>> {
        self.stage_one(ChangeKind::Deleted, entity).await
    }

    pub async fn delete_many(&self, entities: Vec<T>) -> Result<Vec<Entry<T>>> {
        self.stage(ChangeKind::Deleted, entities).await
    }

    /// Track an entity as unchanged without writing it
    pub async fn attach(&self, entity: T) -> Result<Entry<T>> {
        let mut session = self.session.lock().await;
        Ok(session.tracker()?.attach(entity))
    }

    pub async fn attach_many(&self, entities: Vec<T>) -> Result<Vec<Entry<T>>> {
        let mut session = self.session.lock().await;
        let tracker = session.tracker()?;
        Ok(entities
            .into_iter()
            .map(|entity| tracker.attach(entity))
            .collect())
    }

    fn set_filter(query: Query<T>) -> Result<Filter> {
        let plan = query.into_plan();
        if !plan.joins.is_empty() {
            return Err(AppError::InvalidArgument(
                "set-based writes cannot use joins".to_string(),
            ));
        }
        Ok(plan.filter.unwrap_or_else(Filter::all))
    }

    /// Update every row the query matches in one statement, without audit stamping.
    ///
    /// Only the query's predicate and default-filter setting are used.
    pub async fn update_where(
        &self,
        query: Query<T>,
        assignments: Vec<Assignment>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if assignments.is_empty() {
            return Err(AppError::InvalidArgument(
                "set-based update needs at least one assignment".to_string(),
            ));
        }
        let filter = Self::set_filter(query)?;
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled("update_where".to_string()));
        }

        let schema = T::SCHEMA;
        let mut session = self.session.lock().await;
        let affected = session
            .store()?
            .update_where(&schema, &filter, &assignments)
            .await?;
        debug!(table = schema.table, affected = affected, "Set-based update executed");
        Ok(affected)
    }

    /// Physically delete every row the query matches in one statement
    pub async fn delete_where(&self, query: Query<T>, cancel: &CancellationToken) -> Result<u64> {
        let filter = Self::set_filter(query)?;
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled("delete_where".to_string()));
        }

        let schema = T::SCHEMA;
        let mut session = self.session.lock().await;
        let affected = session.store()?.delete_where(&schema, &filter).await?;
        debug!(table = schema.table, affected = affected, "Set-based delete executed");
        Ok(affected)
    }

    /// Commit the ambient transaction
    pub async fn commit(&self) -> Result<()> {
        self.session.lock().await.commit().await
    }

    /// Roll back the ambient transaction
    pub async fn rollback(&self) -> Result<()> {
        self.session.lock().await.rollback().await
    }
}
