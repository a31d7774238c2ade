// Current User Port - ambient identity used for audit stamping

/// Actor recorded when neither the ambient identity nor the caller names one
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Ambient caller identity.
///
/// When a name is available it takes precedence over the actor passed to
/// `save`.
#[cfg_attr(test, mockall::automock)]
pub trait CurrentUser: Send + Sync {
    fn name(&self) -> Option<String>;
}

/// No ambient identity; the actor passed to `save` is always used
pub struct NoCurrentUser;

impl CurrentUser for NoCurrentUser {
    fn name(&self) -> Option<String> {
        None
    }
}
