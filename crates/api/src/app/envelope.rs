//! Uniform JSON envelope for every response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub current_page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub total_records: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PaginationInfo {
    /// `page_size` must be non-zero; [`PageRequest`] guarantees it.
    pub fn new(current_page: u64, page_size: u64, total_records: u64) -> Self {
        let total_pages = total_records.div_ceil(page_size.max(1));
        Self {
            current_page,
            page_size,
            total_pages,
            total_records,
            has_next: current_page < total_pages,
            has_previous: current_page > 1,
        }
    }
}

/// A validated page selection (`page >= 1`, `1 <= page_size <= MAX_PAGE_SIZE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    page_size: u64,
}

impl PageRequest {
    pub fn new(page: u64, page_size: Option<u64>) -> Result<Self, String> {
        if page == 0 {
            return Err("page must be at least 1".to_string());
        }
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(format!("page_size must be between 1 and {MAX_PAGE_SIZE}"));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Cut the requested page out of the full, already ordered, result set.
    pub fn slice<T>(&self, items: Vec<T>) -> (Vec<T>, PaginationInfo) {
        let total = items.len() as u64;
        let info = PaginationInfo::new(self.page, self.page_size, total);
        let skip = (self.page - 1).saturating_mul(self.page_size);
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let take = usize::try_from(self.page_size).unwrap_or(usize::MAX);
        let page = items.into_iter().skip(skip).take(take).collect();
        (page, info)
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::success_with(data, None)
    }

    pub fn paginated(data: T, pagination: PaginationInfo) -> Self {
        Self::success_with(data, Some(pagination))
    }

    fn success_with(data: T, pagination: Option<PaginationInfo>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: Some(Metadata {
                pagination,
                timestamp: Utc::now(),
            }),
        }
    }

    pub fn failure(error: ErrorInfo) -> Self {
        let timestamp = error.timestamp;
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata: Some(Metadata {
                pagination: None,
                timestamp,
            }),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> Response {
    respond(StatusCode::OK, ApiResponse::success(data))
}

pub fn created<T: Serialize>(data: T) -> Response {
    respond(StatusCode::CREATED, ApiResponse::success(data))
}

/// 200 with the whole list, or with one page of it when `page` is set.
pub fn listing<T: Serialize>(items: Vec<T>, page: Option<PageRequest>) -> Response {
    match page {
        None => ok(items),
        Some(page) => {
            let (items, pagination) = page.slice(items);
            respond(StatusCode::OK, ApiResponse::paginated(items, pagination))
        }
    }
}

pub fn respond<T: Serialize>(status: StatusCode, body: ApiResponse<T>) -> Response {
    (status, Json(body)).into_response()
}

/// Acknowledgement body for writes that return no resource.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message: &'static str,
}
