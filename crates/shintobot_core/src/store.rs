use anyhow::Result;
use serde::Serialize;

pub const NS_MAIN: i32 = 0;
pub const NS_TALK: i32 = 1;
pub const NS_USER: i32 = 2;
pub const NS_TEMPLATE: i32 = 10;
pub const NS_CATEGORY: i32 = 14;

/// Current state of one page, fetched fresh for every item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub title: String,
    pub namespace: i32,
    pub text: String,
    pub exists: bool,
    pub revision_id: Option<i64>,
    pub timestamp: Option<String>,
    pub is_redirect: bool,
}

impl PageSnapshot {
    pub fn missing(title: &str, namespace: i32) -> Self {
        Self {
            title: title.to_string(),
            namespace,
            text: String::new(),
            exists: false,
            revision_id: None,
            timestamp: None,
            is_redirect: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub title: String,
    pub text: String,
    pub summary: String,
    /// Revision the new text was derived from; the wiki rejects the edit
    /// with a conflict if the page has moved on since.
    pub base_revision: Option<i64>,
    pub create: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOutcome {
    Saved { revision_id: Option<i64> },
    NoChange,
    Conflict,
    RateLimited,
    Transient(String),
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    RateLimited,
    Transient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumerateScope {
    Namespace { id: i32, include_redirects: bool },
    /// `title` is the full `Category:` page title.
    Category { title: String, namespace: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerateRequest {
    pub scope: EnumerateScope,
    /// Inclusive lower bound for namespace listings.
    pub start_from: Option<String>,
    pub continue_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleBatch {
    pub titles: Vec<(String, i32)>,
    pub next: Option<String>,
}

/// One listing request's answer. Throttled and transient replies are
/// retried by the caller with the same request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumerateOutcome {
    Batch(TitleBatch),
    RateLimited,
    Transient(String),
}

/// Remote read/write page store. Transport failures surface as errors;
/// expected remote answers (conflicts, throttling, missing pages) surface as
/// outcome values.
pub trait PageStore {
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn get_page(&mut self, title: &str) -> Result<PageSnapshot>;
    fn set_text(&mut self, request: &EditRequest) -> Result<EditOutcome>;
    fn enumerate(&mut self, request: &EnumerateRequest) -> Result<EnumerateOutcome>;
    fn delete(&mut self, title: &str, reason: &str) -> Result<DeleteOutcome>;
    fn request_count(&self) -> usize;
}
