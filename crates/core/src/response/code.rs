// Response codes and their HTTP-style status numbers

use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Outcome classification carried by every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    Success,
    Created,
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    UnprocessableEntity,
    Exception,
}

impl ResponseCode {
    pub fn status(&self) -> u16 {
        match self {
            ResponseCode::Success => 200,
            ResponseCode::Created => 201,
            ResponseCode::BadRequest => 400,
            ResponseCode::Unauthorized => 401,
            ResponseCode::NotFound => 404,
            ResponseCode::Conflict => 409,
            ResponseCode::UnprocessableEntity => 422,
            ResponseCode::Exception => 500,
        }
    }

    /// Message used when the caller supplies none
    pub fn default_message(&self) -> &'static str {
        match self {
            ResponseCode::Success => "Request was successful",
            ResponseCode::Created => "Created successfully",
            ResponseCode::BadRequest => "Request failed",
            ResponseCode::Unauthorized => "Authorization error",
            ResponseCode::NotFound => "Data not found",
            ResponseCode::Conflict => "A conflict occurred",
            ResponseCode::UnprocessableEntity => "Invalid data",
            ResponseCode::Exception => "Exception",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseCode::Success | ResponseCode::Created)
    }
}

impl From<&AppError> for ResponseCode {
    fn from(error: &AppError) -> Self {
        match error {
            AppError::Validation(_) | AppError::InvalidArgument(_) => ResponseCode::BadRequest,
            AppError::NotFound(_) => ResponseCode::NotFound,
            AppError::Conflict(_) => ResponseCode::Conflict,
            AppError::Domain(_) | AppError::Serialization(_) => ResponseCode::UnprocessableEntity,
            AppError::Database(_)
            | AppError::Config(_)
            | AppError::InvalidState(_)
            | AppError::Cancelled(_)
            | AppError::Internal(_) => ResponseCode::Exception,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_numbers() {
        assert_eq!(ResponseCode::Success.status(), 200);
        assert_eq!(ResponseCode::Created.status(), 201);
        assert_eq!(ResponseCode::Conflict.status(), 409);
        assert_eq!(ResponseCode::Exception.status(), 500);
    }

    #[test]
    fn test_error_classification() {
        let code = ResponseCode::from(&AppError::Conflict("dup".into()));
        assert_eq!(code, ResponseCode::Conflict);

        let code = ResponseCode::from(&AppError::Config("unregistered".into()));
        assert_eq!(code, ResponseCode::Exception);
        assert!(!code.is_success());
    }
}
