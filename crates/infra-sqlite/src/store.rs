// SQLite Store Implementation

use crate::error::map_sqlx_error;
use crate::sql;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use strata_core::domain::{FieldDef, FieldKind, Record, Schema, Value};
use strata_core::error::{AppError, Result};
use strata_core::port::{InsertOutcome, Store};
use strata_core::query::{Assignment, Filter, SelectPlan};
use tracing::debug;

/// Run `$body` against the open transaction when there is one, else the pool
macro_rules! on_session {
    ($self:ident, |$executor:ident| $body:expr) => {
        match $self.tx.as_mut() {
            Some(tx) => {
                let $executor = &mut **tx;
                $body
            }
            None => {
                let $executor = &$self.pool;
                $body
            }
        }
    };
}

/// Store over a SQLite pool with at most one open transaction.
///
/// While a transaction is open every statement runs on its connection.
/// Dropping the store with an open transaction rolls it back.
pub struct SqliteStore {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, tx: None }
    }

    pub fn boxed(pool: SqlitePool) -> Box<dyn Store> {
        Box::new(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode_field(row: &SqliteRow, field: &FieldDef) -> std::result::Result<Value, sqlx::Error> {
    let name = field.name;
    Ok(match field.kind {
        FieldKind::Integer => row.try_get::<Option<i64>, _>(name)?.into(),
        FieldKind::Real => row.try_get::<Option<f64>, _>(name)?.into(),
        FieldKind::Text => row.try_get::<Option<String>, _>(name)?.into(),
        FieldKind::Bool => row.try_get::<Option<bool>, _>(name)?.into(),
    })
}

fn decode_row(row: &SqliteRow, fields: &[FieldDef]) -> Result<Record> {
    let mut record = Record::with_capacity(fields.len());
    for field in fields {
        record.set(field.name, decode_field(row, field).map_err(map_sqlx_error)?);
    }
    Ok(record)
}

fn no_transaction(operation: &str) -> AppError {
    AppError::InvalidState(format!("cannot {} without an open transaction", operation))
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(AppError::InvalidState(
                "transaction already open".to_string(),
            ));
        }
        self.tx = Some(self.pool.begin().await.map_err(map_sqlx_error)?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| no_transaction("commit"))?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| no_transaction("rollback"))?;
        tx.rollback().await.map_err(map_sqlx_error)
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn fetch(&mut self, schema: &Schema, plan: &SelectPlan) -> Result<Vec<Record>> {
        let mut builder = sql::select_query(schema, plan);
        debug!(sql = builder.sql(), "fetch");
        let rows = on_session!(self, |executor| builder
            .build()
            .fetch_all(executor)
            .await
            .map_err(map_sqlx_error)?);

        let fields = sql::selected_columns(schema, plan);
        rows.iter().map(|row| decode_row(row, fields)).collect()
    }

    async fn count(&mut self, schema: &Schema, plan: &SelectPlan) -> Result<i64> {
        let mut builder = sql::count_query(schema, plan);
        debug!(sql = builder.sql(), "count");
        let count = on_session!(self, |executor| builder
            .build_query_scalar::<i64>()
            .fetch_one(executor)
            .await
            .map_err(map_sqlx_error)?);
        Ok(count)
    }

    async fn exists(&mut self, schema: &Schema, plan: &SelectPlan) -> Result<bool> {
        let mut builder = sql::exists_query(schema, plan);
        debug!(sql = builder.sql(), "exists");
        let found = on_session!(self, |executor| builder
            .build_query_scalar::<i64>()
            .fetch_one(executor)
            .await
            .map_err(map_sqlx_error)?);
        Ok(found != 0)
    }

    async fn insert(&mut self, schema: &Schema, values: &Record) -> Result<InsertOutcome> {
        if values.is_empty() {
            return Err(AppError::InvalidArgument(format!(
                "insert into {} without values",
                schema.table
            )));
        }
        let mut builder = sql::insert_query(schema, values);
        debug!(sql = builder.sql(), "insert");
        let result = on_session!(self, |executor| builder
            .build()
            .execute(executor)
            .await
            .map_err(map_sqlx_error)?);

        Ok(InsertOutcome {
            rows_affected: result.rows_affected(),
            generated_key: schema.generated_key.then(|| result.last_insert_rowid()),
        })
    }

    async fn update(&mut self, schema: &Schema, key: &Value, values: &Record) -> Result<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let mut builder = sql::update_query(schema, key, values);
        debug!(sql = builder.sql(), "update");
        let result = on_session!(self, |executor| builder
            .build()
            .execute(executor)
            .await
            .map_err(map_sqlx_error)?);
        Ok(result.rows_affected())
    }

    async fn delete(&mut self, schema: &Schema, key: &Value) -> Result<u64> {
        let mut builder = sql::delete_query(schema, key);
        debug!(sql = builder.sql(), "delete");
        let result = on_session!(self, |executor| builder
            .build()
            .execute(executor)
            .await
            .map_err(map_sqlx_error)?);
        Ok(result.rows_affected())
    }

    async fn update_where(
        &mut self,
        schema: &Schema,
        filter: &Filter,
        assignments: &[Assignment],
    ) -> Result<u64> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let mut builder = sql::update_where_query(schema, filter, assignments);
        debug!(sql = builder.sql(), "update_where");
        let result = on_session!(self, |executor| builder
            .build()
            .execute(executor)
            .await
            .map_err(map_sqlx_error)?);
        Ok(result.rows_affected())
    }

    async fn delete_where(&mut self, schema: &Schema, filter: &Filter) -> Result<u64> {
        let mut builder = sql::delete_where_query(schema, filter);
        debug!(sql = builder.sql(), "delete_where");
        let result = on_session!(self, |executor| builder
            .build()
            .execute(executor)
            .await
            .map_err(map_sqlx_error)?);
        Ok(result.rows_affected())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(map_sqlx_error)?;
        }
        Ok(())
    }
}
