// Application Layer - sessions, repositories and the unit of work

pub mod catalog;
pub mod change_tracker;
pub mod registry;
pub mod repository;
pub mod session;
pub mod unit_of_work;

// Re-exports
pub use catalog::{catalog_registry, ArticleRepository};
pub use change_tracker::{ChangeKind, ChangeTracker, Entry, EntryState};
pub use registry::{EntityRepository, RepositoryRegistry};
pub use repository::{FilteredData, Grouping, Repository, Row};
pub use session::{Session, SessionState, SharedSession};
pub use unit_of_work::UnitOfWork;
