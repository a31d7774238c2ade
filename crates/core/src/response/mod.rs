// Response Layer - uniform envelopes for single results and pages

pub mod base;
pub mod code;
pub mod paginated;

// Re-exports
pub use base::BaseResponse;
pub use code::ResponseCode;
pub use paginated::PaginatedResult;
