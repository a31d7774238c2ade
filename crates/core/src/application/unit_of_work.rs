// Unit of Work - one session, its repositories and the audited save pipeline

use super::registry::{AnyRepository, EntityRepository, RepositoryRegistry};
use super::repository::Repository;
use super::session::{Session, SessionState, SharedSession};
use crate::domain::capability::{DELETED_BY, DELETED_ON, IS_DELETED};
use crate::domain::Entity;
use crate::error::{AppError, Result};
use crate::port::{
    CurrentUser, NoCurrentUser, Store, SystemTimeProvider, TimeProvider, SYSTEM_ACTOR,
};
use crate::query::Query;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Coordinator owning one session shared by every repository it creates.
///
/// Not meant for concurrent use: operations are serialized on the session.
/// Dropping the unit of work releases the session, rolling back an open
/// transaction.
pub struct UnitOfWork {
    session: SharedSession,
    registry: RepositoryRegistry,
    repositories: Mutex<HashMap<TypeId, AnyRepository>>,
    current_user: Arc<dyn CurrentUser>,
    time_provider: Arc<dyn TimeProvider>,
    disposed: AtomicBool,
    release: Arc<AtomicBool>,
}

impl UnitOfWork {
    pub fn new(store: Box<dyn Store>, registry: RepositoryRegistry) -> Self {
        let session = Session::new(store);
        let release = session.release_flag();
        Self {
            session: Arc::new(AsyncMutex::new(session)),
            registry,
            repositories: Mutex::new(HashMap::new()),
            current_user: Arc::new(NoCurrentUser),
            time_provider: Arc::new(SystemTimeProvider),
            disposed: AtomicBool::new(false),
            release,
        }
    }

    pub fn with_current_user(mut self, current_user: Arc<dyn CurrentUser>) -> Self {
        self.current_user = current_user;
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(AppError::InvalidState(
                "unit of work has been disposed".to_string(),
            ));
        }
        Ok(())
    }

    /// Repository of type `R`, created on first request and cached
    pub fn repository<R: EntityRepository>(&self) -> Result<Arc<R>> {
        self.ensure_usable()?;
        let mut cache = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let repository = match cache.get(&TypeId::of::<R>()) {
            Some(existing) => existing.clone(),
            None => {
                let created = self.registry.create::<R>(self.session.clone())?;
                debug!(repository = std::any::type_name::<R>(), "Repository created");
                cache.insert(TypeId::of::<R>(), created.clone());
                created
            }
        };

        repository.downcast::<R>().map_err(|_| {
            AppError::Internal(format!(
                "cached repository has the wrong type: {}",
                std::any::type_name::<R>()
            ))
        })
    }

    /// Generic repository for entity `T`
    pub fn repo<T: Entity>(&self) -> Result<Arc<Repository<T>>> {
        self.repository::<Repository<T>>()
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    pub async fn has_changes(&self) -> bool {
        let mut session = self.session.lock().await;
        session
            .tracker()
            .map(|tracker| tracker.has_changes())
            .unwrap_or(false)
    }

    pub async fn begin(&self) -> Result<()> {
        self.ensure_usable()?;
        self.session.lock().await.begin().await
    }

    pub async fn commit(&self) -> Result<()> {
        self.ensure_usable()?;
        self.session.lock().await.commit().await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.ensure_usable()?;
        self.session.lock().await.rollback().await
    }

    /// The ambient identity when established, else `fallback`
    pub fn actor(&self, fallback: &str) -> String {
        self.current_user
            .name()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Stamp and flush all pending changes; returns affected rows
    pub async fn save(&self, actor: &str, cancel: &CancellationToken) -> Result<u64> {
        self.ensure_usable()?;
        let actor = self.actor(actor);
        let now = self.time_provider.now_secs();
        self.session.lock().await.save(&actor, now, cancel).await
    }

    /// True iff a save as `SYSTEM` affected at least one row
    pub async fn complete(&self) -> Result<bool> {
        Ok(self.save(SYSTEM_ACTOR, &CancellationToken::new()).await? > 0)
    }

    /// Soft-delete every row whose key is in `ids` with one set-based update.
    ///
    /// An empty batch returns 0 without touching the store.
    pub async fn soft_delete_range<T: Entity>(
        &self,
        ids: &[T::Id],
        actor: &str,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.ensure_usable()?;
        if !T::SCHEMA.capabilities.deletable {
            return Err(AppError::InvalidArgument(format!(
                "{} does not support soft delete",
                T::SCHEMA.table
            )));
        }
        if ids.is_empty() {
            return Ok(0);
        }

        let actor = self.actor(actor);
        let now = self.time_provider.now_secs();
        let query = Query::<T>::new().filter(T::SCHEMA.key.is_in(ids.iter().cloned()));
        let assignments = vec![
            IS_DELETED.set(true),
            DELETED_ON.set(now),
            DELETED_BY.set(actor.as_str()),
        ];

        let affected = Repository::<T>::new(self.session.clone())
            .update_where(query, assignments, cancel)
            .await?;
        info!(
            table = T::SCHEMA.table,
            requested = ids.len(),
            affected = affected,
            actor = %actor,
            "Bulk soft delete"
        );
        Ok(affected)
    }

    /// Release the session and cached repositories; later calls are no-ops
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.session.lock().await.dispose().await?;
        debug!("Unit of work disposed");
        Ok(())
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.repositories
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        match self.session.try_lock() {
            Ok(mut session) => session.release(),
            Err(_) => {
                // the session drops its store on the next locked access
                self.release.store(true, Ordering::Release);
                warn!("Session busy while dropping unit of work, release deferred");
            }
        }
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("registry", &self.registry)
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}
