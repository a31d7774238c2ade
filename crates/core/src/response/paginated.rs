// Paged envelope

use super::code::ResponseCode;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// One page of results plus paging metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub succeeded: bool,
    pub message: Option<String>,
    pub status_code: u16,
    pub data: Vec<T>,
    pub current_page: i32,
    pub page_size: i32,
    pub total_pages: i32,
    pub total_count: i64,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

impl<T> PaginatedResult<T> {
    fn build(
        code: ResponseCode,
        data: Vec<T>,
        total_count: i64,
        page: i32,
        page_size: i32,
        message: Option<String>,
    ) -> Self {
        let total_pages = if page_size > 0 {
            // ceil(total / size) without floating point
            ((total_count + i64::from(page_size) - 1) / i64::from(page_size)) as i32
        } else {
            0
        };

        Self {
            succeeded: code.is_success(),
            message: Some(message.unwrap_or_else(|| code.default_message().to_string())),
            status_code: code.status(),
            data,
            current_page: page,
            page_size,
            total_pages,
            total_count,
            has_previous_page: page > 1,
            has_next_page: page < total_pages,
        }
    }

    pub fn success(
        data: Vec<T>,
        total_count: i64,
        page: i32,
        page_size: i32,
        message: Option<String>,
    ) -> Self {
        Self::build(ResponseCode::Success, data, total_count, page, page_size, message)
    }

    /// Empty page with a failure status
    pub fn failure(code: ResponseCode, page: i32, page_size: i32, message: Option<String>) -> Self {
        Self::build(code, Vec::new(), 0, page, page_size, message)
    }

    pub fn from_error(error: &AppError, page: i32, page_size: i32) -> Self {
        Self::failure(
            ResponseCode::from(error),
            page,
            page_size,
            Some(error.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_metadata() {
        let page = PaginatedResult::success(vec![1, 2, 3], 25, 2, 10, None);

        assert_eq!(page.total_pages, 3);
        assert!(page.has_previous_page);
        assert!(page.has_next_page);
        assert_eq!(page.status_code, 200);

        let last = PaginatedResult::success(vec![1], 25, 3, 10, None);
        assert!(!last.has_next_page);

        let first = PaginatedResult::success(vec![1], 25, 1, 10, None);
        assert!(!first.has_previous_page);
    }

    #[test]
    fn test_empty_result_has_no_pages() {
        let page = PaginatedResult::<i32>::success(Vec::new(), 0, 1, 10, None);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next_page);
    }

    #[test]
    fn test_from_error() {
        let page = PaginatedResult::<i32>::from_error(&AppError::Database("locked".into()), 1, 10);

        assert!(!page.succeeded);
        assert_eq!(page.status_code, 500);
        assert!(page.data.is_empty());
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let value = serde_json::to_value(PaginatedResult::success(vec!["a"], 1, 1, 10, None)).unwrap();

        for key in [
            "succeeded",
            "message",
            "statusCode",
            "data",
            "currentPage",
            "pageSize",
            "totalPages",
            "totalCount",
            "hasPreviousPage",
            "hasNextPage",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }
}
