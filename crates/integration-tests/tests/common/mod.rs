//! Shared fixtures: an in-memory catalog database and a controllable clock

#![allow(dead_code)]

use sqlx::SqlitePool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use strata_core::application::{catalog_registry, UnitOfWork};
use strata_core::domain::{Article, Label};
use strata_core::port::TimeProvider;
use strata_infra_sqlite::{create_pool, run_migrations, SqliteStore, StoreConfig};
use tokio_util::sync::CancellationToken;

/// Clock that only moves when a test says so
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn at(secs: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(secs)))
    }

    pub fn set(&self, secs: i64) {
        self.0.store(secs, Ordering::SeqCst);
    }
}

impl TimeProvider for FixedClock {
    fn now_secs(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Catalog {
    pub pool: SqlitePool,
    pub clock: Arc<FixedClock>,
}

impl Catalog {
    pub async fn new() -> Self {
        let pool = create_pool(&StoreConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Self {
            pool,
            clock: FixedClock::at(1_000),
        }
    }

    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(SqliteStore::boxed(self.pool.clone()), catalog_registry())
            .with_time_provider(self.clock.clone())
    }

    /// Insert `count` articles titled "Article 01".. in one save
    pub async fn seed_articles(&self, count: usize, actor: &str) -> Vec<i64> {
        let uow = self.unit_of_work();
        let articles = uow.repo::<Article>().unwrap();
        let batch = (1..=count)
            .map(|n| Article::new(format!("Article {:02}", n), None))
            .collect();
        let entries = articles.insert_many(batch).await.unwrap();
        uow.save(actor, &CancellationToken::new()).await.unwrap();
        uow.dispose().await.unwrap();
        entries.iter().map(|entry| entry.id()).collect()
    }

    pub async fn seed_label(&self, name: &str) -> i64 {
        let uow = self.unit_of_work();
        let entry = uow.repo::<Label>().unwrap().insert(Label::new(name)).await.unwrap();
        uow.save("seed", &CancellationToken::new()).await.unwrap();
        uow.dispose().await.unwrap();
        entry.id()
    }

    /// Physical row count, soft-deleted rows included
    pub async fn raw_count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}
