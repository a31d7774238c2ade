// Port Layer - Interfaces for external dependencies

pub mod current_user;
pub mod store;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use current_user::{CurrentUser, NoCurrentUser, SYSTEM_ACTOR};
pub use store::{InsertOutcome, Store};
pub use time_provider::{SystemTimeProvider, TimeProvider};

#[cfg(test)]
pub use current_user::MockCurrentUser;
#[cfg(test)]
pub use store::MockStore;
#[cfg(test)]
pub use time_provider::MockTimeProvider;
