// Store Port (Interface)
//
// A store owns one connection scope and at most one open transaction. The
// session layer decides when to begin and end transactions; a store only
// executes what it is given.

use crate::domain::{Record, Schema, Value};
use crate::error::Result;
use crate::query::{Assignment, Filter, SelectPlan};
use async_trait::async_trait;

/// Result of a single-row insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub rows_affected: u64,
    /// Key assigned by the store, for schemas with generated keys
    pub generated_key: Option<i64>,
}

/// Persistence interface behind repositories and the unit of work
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send {
    /// Open a transaction; every later call runs inside it until commit or rollback
    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Rows matching the plan, decoded by field kind
    async fn fetch(&mut self, schema: &Schema, plan: &SelectPlan) -> Result<Vec<Record>>;

    /// Number of rows the plan selects, ignoring its paging
    async fn count(&mut self, schema: &Schema, plan: &SelectPlan) -> Result<i64>;

    async fn exists(&mut self, schema: &Schema, plan: &SelectPlan) -> Result<bool>;

    async fn insert(&mut self, schema: &Schema, values: &Record) -> Result<InsertOutcome>;

    /// Update the row with `key`, writing only the columns in `values`
    async fn update(&mut self, schema: &Schema, key: &Value, values: &Record) -> Result<u64>;

    async fn delete(&mut self, schema: &Schema, key: &Value) -> Result<u64>;

    /// Set-based update of every row matching `filter`
    async fn update_where(
        &mut self,
        schema: &Schema,
        filter: &Filter,
        assignments: &[Assignment],
    ) -> Result<u64>;

    /// Set-based delete of every row matching `filter`
    async fn delete_where(&mut self, schema: &Schema, filter: &Filter) -> Result<u64>;

    /// Release the connection scope; an open transaction is rolled back
    async fn close(&mut self) -> Result<()>;
}
