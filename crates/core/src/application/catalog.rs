// Catalog repositories built on the generic repository

use super::registry::{EntityRepository, RepositoryRegistry};
use super::repository::{Grouping, Repository};
use crate::domain::capability::MODIFIED_ON;
use crate::domain::{Article, Entity, Label};
use crate::error::Result;
use crate::query::{Join, ReadOptions};
use std::ops::Deref;

/// Article repository with label-aware reads
#[derive(Clone)]
pub struct ArticleRepository {
    base: Repository<Article>,
}

impl EntityRepository for ArticleRepository {
    type Entity = Article;

    fn from_base(base: Repository<Article>) -> Self {
        Self { base }
    }
}

impl Deref for ArticleRepository {
    type Target = Repository<Article>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl ArticleRepository {
    /// Articles whose label has the given name
    pub async fn by_label_name(&self, name: &str) -> Result<Vec<Article>> {
        let join = Join::new(Label::SCHEMA.table, Article::LABEL_ID.name, Label::ID.name)
            .filter(Label::NAME.eq(name));
        self.base
            .get_children(join, None, ReadOptions::default())
            .await
    }

    /// Most recently modified articles
    pub async fn latest(&self, take: i64) -> Result<Vec<Article>> {
        let query = self.base.query().order_by(MODIFIED_ON.desc()).take(take);
        self.base.get_data(query, ReadOptions::default()).await
    }

    /// `(label_id, article count)` per label, largest first
    pub async fn count_by_label(&self) -> Result<Vec<(Option<i64>, usize)>> {
        let grouping = Grouping::new()
            .group_by(|article: &Article| article.label_id)
            .select(|label: &Option<i64>, members: &[Article]| (*label, members.len()))
            .order_by(|a: &(Option<i64>, usize), b: &(Option<i64>, usize)| b.1.cmp(&a.1));
        self.base.get_grouped(grouping).await
    }
}

/// Registry with every catalog repository
pub fn catalog_registry() -> RepositoryRegistry {
    RepositoryRegistry::new()
        .register_entity::<Article>()
        .register_entity::<Label>()
        .register::<ArticleRepository>()
}
