// Query Layer - typed filters, query plans and filter-request expansion

pub mod builder;
pub mod filter;
pub mod plan;
pub mod request;

// Re-exports
pub use builder::{build_filter_query, resolve_ordering, resolve_projection, FilterQuery, Transform};
pub use filter::{Assignment, CompareOp, Direction, Filter, SortKey};
pub use plan::{Join, Query, ReadOptions, SelectPlan, Tracking};
pub use request::{FilterRequest, PageWindow, MAX_PAGE_LENGTH};
