// Single-result envelope

use super::code::ResponseCode;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `{succeeded, message, errors, statusCode, meta, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseResponse<T> {
    pub succeeded: bool,
    pub message: Option<String>,
    /// Field name → messages
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub data: Option<T>,
}

impl<T> BaseResponse<T> {
    fn with_code(code: ResponseCode, message: Option<String>, data: Option<T>) -> Self {
        Self {
            succeeded: code.is_success(),
            message: Some(
                message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| code.default_message().to_string()),
            ),
            errors: BTreeMap::new(),
            status_code: code.status(),
            meta: None,
            data,
        }
    }

    pub fn success(data: T, message: Option<String>) -> Self {
        Self::with_code(ResponseCode::Success, message, Some(data))
    }

    pub fn created(data: T, message: Option<String>) -> Self {
        Self::with_code(ResponseCode::Created, message, Some(data))
    }

    pub fn deleted() -> Self {
        Self::with_code(
            ResponseCode::Success,
            Some("Deleted successfully".to_string()),
            None,
        )
    }

    pub fn not_found(message: Option<String>) -> Self {
        Self::with_code(ResponseCode::NotFound, message, None)
    }

    pub fn bad_request(message: Option<String>, errors: BTreeMap<String, Vec<String>>) -> Self {
        let mut response = Self::with_code(ResponseCode::BadRequest, message, None);
        response.errors = errors;
        response
    }

    pub fn conflict(message: Option<String>) -> Self {
        Self::with_code(ResponseCode::Conflict, message, None)
    }

    pub fn unprocessable(message: Option<String>) -> Self {
        Self::with_code(ResponseCode::UnprocessableEntity, message, None)
    }

    pub fn unauthorized(message: Option<String>) -> Self {
        Self::with_code(ResponseCode::Unauthorized, message, None)
    }

    /// Normalize an error into a failed envelope
    pub fn from_error(error: &AppError) -> Self {
        Self::with_code(ResponseCode::from(error), Some(error.to_string()), None)
    }

    /// `Ok` becomes a success envelope, `Err` a classified failure
    pub fn from_result(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(data) => Self::success(data, None),
            Err(e) => Self::from_error(&e),
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_uses_default_message_for_blank() {
        let response = BaseResponse::success(5, Some("  ".into()));

        assert!(response.succeeded);
        assert_eq!(response.status_code, 200);
        assert_eq!(response.message.as_deref(), Some("Request was successful"));
        assert_eq!(response.data, Some(5));
    }

    #[test]
    fn test_bad_request_carries_field_errors() {
        let mut errors = BTreeMap::new();
        errors.insert("title".to_string(), vec!["required".to_string()]);

        let response = BaseResponse::<()>::bad_request(None, errors);

        assert!(!response.succeeded);
        assert_eq!(response.status_code, 400);
        assert_eq!(response.errors["title"], vec!["required".to_string()]);
    }

    #[test]
    fn test_from_error_keeps_message() {
        let response = BaseResponse::<()>::from_error(&AppError::NotFound("article 7".into()));

        assert!(!response.succeeded);
        assert_eq!(response.status_code, 404);
        assert_eq!(response.message.as_deref(), Some("Not found: article 7"));
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(BaseResponse::created("x", None).with_meta(json!({"v": 1})))
            .unwrap();

        assert_eq!(value["statusCode"], 201);
        assert_eq!(value["succeeded"], true);
        assert_eq!(value["meta"]["v"], 1);
        assert_eq!(value["data"], "x");
        assert!(value["errors"].as_object().unwrap().is_empty());
    }
}
