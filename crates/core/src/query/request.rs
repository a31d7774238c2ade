// Filter request - normalized pagination input

use serde::{Deserialize, Serialize};

/// Largest page a caller may request
pub const MAX_PAGE_LENGTH: i32 = 50;

/// Page, length, ordering, selection and date range for list operations.
///
/// Wire shape: `{length, page, orderBy, select, fromDate, toDate, searchText}`.
/// Every field is optional on the wire. `searchText` is carried but never
/// turned into a predicate; callers supply their own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterRequest {
    pub length: i32,
    pub page: i32,
    pub order_by: Vec<String>,
    pub select: Vec<String>,
    /// Epoch seconds; 0 disables the lower bound
    pub from_date: i64,
    /// Epoch seconds; values ≤ 0 disable the upper bound
    pub to_date: i64,
    pub search_text: Option<String>,
}

/// Resolved paging arithmetic for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i32,
    pub length: i32,
    pub skip: i64,
    pub take: i64,
    /// Offset of the has-next-page probe: `(page + 1) * length`
    pub probe_offset: i64,
}

impl FilterRequest {
    pub fn new(page: i32, length: i32) -> Self {
        Self {
            page,
            length,
            ..Self::default()
        }
    }

    pub fn order_by<S: Into<String>>(mut self, tokens: impl IntoIterator<Item = S>) -> Self {
        self.order_by = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn select<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.select = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn between(mut self, from_date: i64, to_date: i64) -> Self {
        self.from_date = from_date;
        self.to_date = to_date;
        self
    }

    /// Length clamped into `[1, MAX_PAGE_LENGTH]`
    pub fn effective_length(&self) -> i32 {
        self.length.clamp(1, MAX_PAGE_LENGTH)
    }

    /// Page floored at 0
    pub fn effective_page(&self) -> i32 {
        self.page.max(0)
    }

    /// Copy with out-of-range paging recovered by clamping
    pub fn normalized(&self) -> FilterRequest {
        FilterRequest {
            length: self.effective_length(),
            page: self.effective_page(),
            ..self.clone()
        }
    }

    /// Pages are 1-based; page 0 and page 1 address the same slice
    pub fn window(&self) -> PageWindow {
        let page = self.effective_page();
        let length = self.effective_length();
        let skip = ((i64::from(page) - 1) * i64::from(length)).max(0);
        PageWindow {
            page,
            length,
            skip,
            take: i64::from(length),
            probe_offset: (i64::from(page) + 1) * i64::from(length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_is_clamped() {
        assert_eq!(FilterRequest::new(1, 1000).effective_length(), 50);
        assert_eq!(FilterRequest::new(1, -5).effective_length(), 1);
        assert_eq!(FilterRequest::new(1, 0).effective_length(), 1);
        assert_eq!(FilterRequest::new(1, 25).effective_length(), 25);
    }

    #[test]
    fn test_page_is_floored() {
        assert_eq!(FilterRequest::new(-1, 10).effective_page(), 0);
        assert_eq!(FilterRequest::new(3, 10).effective_page(), 3);
    }

    #[test]
    fn test_normalized_keeps_other_fields() {
        let request = FilterRequest::new(-4, 99).order_by(["title desc"]).between(5, 9);
        let normalized = request.normalized();

        assert_eq!(normalized.page, 0);
        assert_eq!(normalized.length, 50);
        assert_eq!(normalized.order_by, vec!["title desc".to_string()]);
        assert_eq!((normalized.from_date, normalized.to_date), (5, 9));
    }

    #[test]
    fn test_window_page_zero_and_one_are_equivalent() {
        let zero = FilterRequest::new(0, 10).window();
        let one = FilterRequest::new(1, 10).window();

        assert_eq!(zero.skip, 0);
        assert_eq!(one.skip, 0);
        assert_eq!(zero.take, one.take);
    }

    #[test]
    fn test_window_arithmetic() {
        let window = FilterRequest::new(3, 10).window();

        assert_eq!(window.skip, 20);
        assert_eq!(window.take, 10);
        assert_eq!(window.probe_offset, 40);
    }

    #[test]
    fn test_wire_shape_is_camel_case_and_optional() {
        let request: FilterRequest = serde_json::from_str(
            r#"{"page":2,"length":5,"orderBy":["title desc"],"fromDate":10,"searchText":"x"}"#,
        )
        .unwrap();

        assert_eq!(request.page, 2);
        assert_eq!(request.order_by, vec!["title desc".to_string()]);
        assert!(request.select.is_empty());
        assert_eq!(request.to_date, 0);
        assert_eq!(request.search_text.as_deref(), Some("x"));

        let empty: FilterRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, FilterRequest::default());
    }
}
