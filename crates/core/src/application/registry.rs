// Repository Registry - which repository types a unit of work may hand out

use super::repository::Repository;
use super::session::SharedSession;
use crate::domain::Entity;
use crate::error::{AppError, Result};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A repository type constructible over the shared session.
///
/// `Repository<T>` implements this directly; custom repositories wrap one.
pub trait EntityRepository: Send + Sync + 'static {
    type Entity: Entity;

    fn from_base(base: Repository<Self::Entity>) -> Self;
}

impl<T: Entity> EntityRepository for Repository<T> {
    type Entity = T;

    fn from_base(base: Repository<T>) -> Self {
        base
    }
}

pub(crate) type AnyRepository = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(SharedSession) -> AnyRepository + Send + Sync>;

/// Registered repository factories keyed by repository type
#[derive(Clone, Default)]
pub struct RepositoryRegistry {
    factories: HashMap<TypeId, (&'static str, Factory)>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: EntityRepository>(mut self) -> Self {
        let factory: Factory =
            Arc::new(|session| Arc::new(R::from_base(Repository::new(session))) as AnyRepository);
        self.factories
            .insert(TypeId::of::<R>(), (type_name::<R>(), factory));
        self
    }

    /// Shorthand for `register::<Repository<T>>()`
    pub fn register_entity<T: Entity>(self) -> Self {
        self.register::<Repository<T>>()
    }

    pub fn is_registered<R: EntityRepository>(&self) -> bool {
        self.factories.contains_key(&TypeId::of::<R>())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub(crate) fn create<R: EntityRepository>(&self, session: SharedSession) -> Result<AnyRepository> {
        match self.factories.get(&TypeId::of::<R>()) {
            Some((_, factory)) => Ok(factory(session)),
            None => Err(AppError::Config(format!(
                "no repository registered for {}",
                type_name::<R>()
            ))),
        }
    }
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.factories.values().map(|(name, _)| name))
            .finish()
    }
}
