use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::BotConfig;
use crate::store::{
    DeleteOutcome, EditOutcome, EditRequest, EnumerateOutcome, EnumerateRequest, EnumerateScope,
    PageSnapshot, PageStore, TitleBatch,
};
use crate::wikitext::parse_redirect;

const LIST_LIMIT: &str = "500";

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub read_interval: Duration,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            api_url: config.api_url(),
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            read_interval: config.read_interval(),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            max_write_retries: 1,
            retry_delay_ms: env_value_u64("WIKI_RETRY_DELAY_MS", 500),
        }
    }
}

/// Result of one API call after the client's own retries.
#[derive(Debug, Clone, PartialEq)]
enum ApiReply {
    Payload(Value),
    Error { code: String, info: String },
    Throttled,
    Unavailable(String),
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_read_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        Url::parse(&config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", config.api_url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_read_at: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    fn call(&mut self, params: &[(&str, String)], is_write: bool) -> Result<ApiReply> {
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            pairs.push(((*key).to_string(), value.clone()));
        }

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            let request = if is_write {
                self.client.post(&self.config.api_url).form(&pairs)
            } else {
                self.client.get(&self.config.api_url).query(&pairs)
            };
            let response = request
                .header("User-Agent", self.config.user_agent.clone())
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if status == StatusCode::TOO_MANY_REQUESTS && is_write {
                            return Ok(ApiReply::Throttled);
                        }
                        if attempt < max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, is_write);
                            continue;
                        }
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            return Ok(ApiReply::Throttled);
                        }
                        if is_retryable_status(status) || status.is_server_error() {
                            return Ok(ApiReply::Unavailable(format!("HTTP {status}")));
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    return Ok(classify_payload(payload));
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    if is_retryable_error(&error) {
                        return Ok(ApiReply::Unavailable(error.to_string()));
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    /// Read call where every non-payload reply is an error.
    fn query(&mut self, params: &[(&str, String)]) -> Result<Value> {
        match self.call(params, false)? {
            ApiReply::Payload(payload) => Ok(payload),
            ApiReply::Error { code, info } => bail!("MediaWiki API error [{code}]: {info}"),
            ApiReply::Throttled => bail!("MediaWiki API request was rate limited"),
            ApiReply::Unavailable(detail) => bail!("MediaWiki API unavailable: {detail}"),
        }
    }

    /// Spaces reads; writes are spaced by the runner's limiter.
    fn apply_rate_limit(&mut self, is_write: bool) {
        if !is_write {
            if let Some(last) = self.last_read_at {
                let elapsed = last.elapsed();
                if elapsed < self.config.read_interval {
                    sleep(self.config.read_interval - elapsed);
                }
            }
            self.last_read_at = Some(Instant::now());
        }
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.query(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

impl PageStore for MediaWikiClient {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.query(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let reply = self.call(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let login_response = match reply {
            ApiReply::Payload(payload) => payload,
            ApiReply::Error { code, info } => bail!("MediaWiki login failed [{code}]: {info}"),
            ApiReply::Throttled => bail!("MediaWiki login was rate limited"),
            ApiReply::Unavailable(detail) => bail!("MediaWiki login failed: {detail}"),
        };
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.csrf_token = None;
                debug!(user = username, "logged in");
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    fn get_page(&mut self, title: &str) -> Result<PageSnapshot> {
        let response = self.query(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content|timestamp|ids".to_string()),
            ("rvslots", "main".to_string()),
        ])?;
        snapshot_from_response(title, response)
    }

    fn set_text(&mut self, request: &EditRequest) -> Result<EditOutcome> {
        let token = self.ensure_csrf_token()?;
        let mut params = vec![
            ("action", "edit".to_string()),
            ("title", request.title.clone()),
            ("text", request.text.clone()),
            ("summary", request.summary.clone()),
            ("bot", "1".to_string()),
        ];
        if let Some(revision) = request.base_revision {
            params.push(("baserevid", revision.to_string()));
        }
        if request.create {
            params.push(("createonly", "1".to_string()));
        } else {
            params.push(("nocreate", "1".to_string()));
        }
        params.push(("token", token));

        match self.call(&params, true)? {
            ApiReply::Payload(payload) => edit_outcome_from_payload(&request.title, payload),
            ApiReply::Error { code, info } => {
                if code == "badtoken" {
                    self.csrf_token = None;
                }
                edit_outcome_for_error(&code)
                    .ok_or_else(|| anyhow::anyhow!("MediaWiki API error [{code}]: {info}"))
            }
            ApiReply::Throttled => Ok(EditOutcome::RateLimited),
            ApiReply::Unavailable(detail) => Ok(EditOutcome::Transient(detail)),
        }
    }

    fn enumerate(&mut self, request: &EnumerateRequest) -> Result<EnumerateOutcome> {
        let params = enumerate_params(request);
        let reply = self.call(&params, false)?;
        enumerate_outcome_from_reply(&request.scope, reply)
    }

    fn delete(&mut self, title: &str, reason: &str) -> Result<DeleteOutcome> {
        let token = self.ensure_csrf_token()?;
        let reply = self.call(
            &[
                ("action", "delete".to_string()),
                ("title", title.to_string()),
                ("reason", reason.to_string()),
                ("token", token),
            ],
            true,
        )?;
        match reply {
            ApiReply::Payload(_) => Ok(DeleteOutcome::Deleted),
            ApiReply::Error { code, info } => {
                if code == "badtoken" {
                    self.csrf_token = None;
                }
                delete_outcome_for_error(&code)
                    .ok_or_else(|| anyhow::anyhow!("MediaWiki API error [{code}]: {info}"))
            }
            ApiReply::Throttled => Ok(DeleteOutcome::RateLimited),
            ApiReply::Unavailable(detail) => Ok(DeleteOutcome::Transient(detail)),
        }
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn classify_payload(payload: Value) -> ApiReply {
    match payload.get("error") {
        Some(error) => {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("unknown info")
                .to_string();
            ApiReply::Error { code, info }
        }
        None => ApiReply::Payload(payload),
    }
}

/// Maps edit API error codes that are expected outcomes. Anything else is
/// an unexpected failure.
fn edit_outcome_for_error(code: &str) -> Option<EditOutcome> {
    match code {
        "editconflict" | "articleexists" => Some(EditOutcome::Conflict),
        "ratelimited" => Some(EditOutcome::RateLimited),
        "missingtitle" | "nocreate-missing" | "pagedeleted" => Some(EditOutcome::Missing),
        "maxlag" | "readonly" | "badtoken" | "internal_api_error_DBQueryError" => {
            Some(EditOutcome::Transient(code.to_string()))
        }
        _ => None,
    }
}

fn delete_outcome_for_error(code: &str) -> Option<DeleteOutcome> {
    match code {
        "missingtitle" | "cannotdelete" => Some(DeleteOutcome::NotFound),
        "ratelimited" => Some(DeleteOutcome::RateLimited),
        "maxlag" | "readonly" | "badtoken" => Some(DeleteOutcome::Transient(code.to_string())),
        _ => None,
    }
}

fn enumerate_outcome_from_reply(scope: &EnumerateScope, reply: ApiReply) -> Result<EnumerateOutcome> {
    match reply {
        ApiReply::Payload(payload) => Ok(EnumerateOutcome::Batch(title_batch_from_response(
            scope, payload,
        )?)),
        ApiReply::Error { code, info } => match code.as_str() {
            "ratelimited" => Ok(EnumerateOutcome::RateLimited),
            "maxlag" | "readonly" | "internal_api_error_DBQueryError" => {
                Ok(EnumerateOutcome::Transient(code))
            }
            _ => bail!("MediaWiki API error [{code}]: {info}"),
        },
        ApiReply::Throttled => Ok(EnumerateOutcome::RateLimited),
        ApiReply::Unavailable(detail) => Ok(EnumerateOutcome::Transient(detail)),
    }
}

fn edit_outcome_from_payload(title: &str, payload: Value) -> Result<EditOutcome> {
    let parsed: EditResponse =
        serde_json::from_value(payload).context("failed to decode edit response")?;
    let edit = parsed
        .edit
        .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
    if edit.result.as_deref() != Some("Success") {
        bail!(
            "MediaWiki edit failed for {}: {}",
            title,
            edit.result.unwrap_or_else(|| "unknown".to_string())
        );
    }
    if edit.nochange {
        return Ok(EditOutcome::NoChange);
    }
    Ok(EditOutcome::Saved {
        revision_id: edit.newrevid,
    })
}

fn snapshot_from_response(title: &str, response: Value) -> Result<PageSnapshot> {
    let parsed: QueryResponse = serde_json::from_value(response)
        .context("failed to decode page content API response")?;
    let page = parsed
        .query
        .pages
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("page not returned by API: {title}"))?;
    if page.invalid {
        bail!("invalid page title: {title}");
    }
    if page.missing {
        return Ok(PageSnapshot::missing(&page.title, page.ns));
    }
    let revision = page
        .revisions
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no revision returned for {title}"))?;
    let content = revision
        .slots
        .and_then(|slots| slots.main)
        .map(|slot| slot.content)
        .ok_or_else(|| anyhow::anyhow!("no main slot content returned for {title}"))?;
    Ok(PageSnapshot {
        is_redirect: parse_redirect(&content).0,
        title: page.title,
        namespace: page.ns,
        text: content,
        exists: true,
        revision_id: Some(revision.revid),
        timestamp: Some(revision.timestamp),
    })
}

fn enumerate_params(request: &EnumerateRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![("action", "query".to_string())];
    match &request.scope {
        EnumerateScope::Namespace {
            id,
            include_redirects,
        } => {
            params.push(("list", "allpages".to_string()));
            params.push(("apnamespace", id.to_string()));
            params.push(("aplimit", LIST_LIMIT.to_string()));
            let filter = if *include_redirects {
                "all"
            } else {
                "nonredirects"
            };
            params.push(("apfilterredir", filter.to_string()));
            if let Some(start) = &request.start_from {
                params.push(("apfrom", start.clone()));
            }
            if let Some(token) = &request.continue_token {
                params.push(("apcontinue", token.clone()));
            }
        }
        EnumerateScope::Category { title, namespace } => {
            params.push(("list", "categorymembers".to_string()));
            params.push(("cmtitle", title.clone()));
            params.push(("cmprop", "title".to_string()));
            params.push(("cmlimit", LIST_LIMIT.to_string()));
            if let Some(namespace) = namespace {
                params.push(("cmnamespace", namespace.to_string()));
            }
            if let Some(token) = &request.continue_token {
                params.push(("cmcontinue", token.clone()));
            }
        }
    }
    params
}

fn title_batch_from_response(scope: &EnumerateScope, response: Value) -> Result<TitleBatch> {
    let parsed: QueryResponse =
        serde_json::from_value(response).context("failed to decode listing API response")?;
    let (items, next) = match scope {
        EnumerateScope::Namespace { .. } => (
            parsed.query.allpages,
            parsed.continuation.and_then(|cont| cont.apcontinue),
        ),
        EnumerateScope::Category { .. } => (
            parsed.query.categorymembers,
            parsed.continuation.and_then(|cont| cont.cmcontinue),
        ),
    };
    Ok(TitleBatch {
        titles: items.into_iter().map(|item| (item.title, item.ns)).collect(),
        next,
    })
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    allpages: Vec<TitleQueryItem>,
    #[serde(default)]
    categorymembers: Vec<TitleQueryItem>,
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    apcontinue: Option<String>,
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TitleQueryItem {
    title: String,
    #[serde(default)]
    ns: i32,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    #[serde(default)]
    ns: i32,
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    revid: i64,
    timestamp: String,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
    #[serde(default)]
    nochange: bool,
    newrevid: Option<i64>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::NS_CATEGORY;

    #[test]
    fn api_errors_are_classified() {
        let reply = classify_payload(json!({
            "error": {"code": "editconflict", "info": "Edit conflict."}
        }));
        assert_eq!(
            reply,
            ApiReply::Error {
                code: "editconflict".to_string(),
                info: "Edit conflict.".to_string()
            }
        );
        let payload = json!({"edit": {"result": "Success"}});
        assert_eq!(
            classify_payload(payload.clone()),
            ApiReply::Payload(payload)
        );
    }

    #[test]
    fn edit_error_codes_map_to_outcomes() {
        assert_eq!(
            edit_outcome_for_error("editconflict"),
            Some(EditOutcome::Conflict)
        );
        assert_eq!(
            edit_outcome_for_error("ratelimited"),
            Some(EditOutcome::RateLimited)
        );
        assert_eq!(
            edit_outcome_for_error("missingtitle"),
            Some(EditOutcome::Missing)
        );
        assert_eq!(
            edit_outcome_for_error("maxlag"),
            Some(EditOutcome::Transient("maxlag".to_string()))
        );
        assert_eq!(edit_outcome_for_error("protectedpage"), None);
        assert_eq!(
            delete_outcome_for_error("missingtitle"),
            Some(DeleteOutcome::NotFound)
        );
        assert_eq!(delete_outcome_for_error("permissiondenied"), None);
    }

    #[test]
    fn edit_payloads_decode() {
        assert_eq!(
            edit_outcome_from_payload(
                "A",
                json!({"edit": {"result": "Success", "newrevid": 42}})
            )
            .expect("saved"),
            EditOutcome::Saved {
                revision_id: Some(42)
            }
        );
        assert_eq!(
            edit_outcome_from_payload("A", json!({"edit": {"result": "Success", "nochange": true}}))
                .expect("nochange"),
            EditOutcome::NoChange
        );
        assert!(
            edit_outcome_from_payload("A", json!({"edit": {"result": "Failure"}})).is_err()
        );
        assert!(edit_outcome_from_payload("A", json!({})).is_err());
    }

    #[test]
    fn page_snapshots_decode() {
        let snapshot = snapshot_from_response(
            "Category:Shrines",
            json!({"query": {"pages": [{
                "pageid": 7,
                "ns": 14,
                "title": "Category:Shrines",
                "revisions": [{
                    "revid": 99,
                    "timestamp": "2026-02-19T00:00:00Z",
                    "slots": {"main": {"content": "#REDIRECT [[Category:Jinja]]"}}
                }]
            }]}}),
        )
        .expect("snapshot");
        assert!(snapshot.exists);
        assert!(snapshot.is_redirect);
        assert_eq!(snapshot.namespace, NS_CATEGORY);
        assert_eq!(snapshot.revision_id, Some(99));

        let missing = snapshot_from_response(
            "Nowhere",
            json!({"query": {"pages": [{"ns": 0, "title": "Nowhere", "missing": true}]}}),
        )
        .expect("missing");
        assert!(!missing.exists);
        assert!(missing.text.is_empty());

        assert!(
            snapshot_from_response(
                "Bad|title",
                json!({"query": {"pages": [{"title": "Bad|title", "invalid": true}]}})
            )
            .is_err()
        );
    }

    #[test]
    fn listing_params_and_batches() {
        let request = EnumerateRequest {
            scope: EnumerateScope::Namespace {
                id: NS_CATEGORY,
                include_redirects: false,
            },
            start_from: Some("M".to_string()),
            continue_token: Some("Nara".to_string()),
        };
        let params = enumerate_params(&request);
        assert!(params.contains(&("apfilterredir", "nonredirects".to_string())));
        assert!(params.contains(&("apfrom", "M".to_string())));
        assert!(params.contains(&("apcontinue", "Nara".to_string())));

        let batch = title_batch_from_response(
            &request.scope,
            json!({
                "continue": {"apcontinue": "Osaka", "continue": "-||"},
                "query": {"allpages": [
                    {"pageid": 1, "ns": 14, "title": "Category:Mie"},
                    {"pageid": 2, "ns": 14, "title": "Category:Nara"}
                ]}
            }),
        )
        .expect("batch");
        assert_eq!(batch.titles.len(), 2);
        assert_eq!(batch.next.as_deref(), Some("Osaka"));

        let category = EnumerateScope::Category {
            title: "Category:Shrines".to_string(),
            namespace: Some(0),
        };
        let batch = title_batch_from_response(
            &category,
            json!({"query": {"categorymembers": [{"ns": 0, "title": "Ise Grand Shrine"}]}}),
        )
        .expect("batch");
        assert_eq!(batch.titles, vec![("Ise Grand Shrine".to_string(), 0)]);
        assert!(batch.next.is_none());
    }

    #[test]
    fn listing_replies_map_to_outcomes() {
        let scope = EnumerateScope::Namespace {
            id: NS_CATEGORY,
            include_redirects: false,
        };
        assert_eq!(
            enumerate_outcome_from_reply(&scope, ApiReply::Unavailable("HTTP 503".to_string()))
                .expect("outcome"),
            EnumerateOutcome::Transient("HTTP 503".to_string())
        );
        assert_eq!(
            enumerate_outcome_from_reply(&scope, ApiReply::Throttled).expect("outcome"),
            EnumerateOutcome::RateLimited
        );
        assert_eq!(
            enumerate_outcome_from_reply(
                &scope,
                ApiReply::Error {
                    code: "maxlag".to_string(),
                    info: "Waiting for replicas".to_string()
                }
            )
            .expect("outcome"),
            EnumerateOutcome::Transient("maxlag".to_string())
        );
        assert!(
            enumerate_outcome_from_reply(
                &scope,
                ApiReply::Error {
                    code: "badvalue".to_string(),
                    info: "Unrecognized value".to_string()
                }
            )
            .is_err()
        );
        assert_eq!(
            enumerate_outcome_from_reply(
                &scope,
                ApiReply::Payload(json!({"query": {"allpages": []}}))
            )
            .expect("outcome"),
            EnumerateOutcome::Batch(TitleBatch::default())
        );
    }

    #[test]
    fn client_rejects_invalid_api_url() {
        let config = MediaWikiClientConfig {
            api_url: "not a url".to_string(),
            user_agent: "test".to_string(),
            timeout_ms: 1_000,
            read_interval: Duration::ZERO,
            max_retries: 0,
            max_write_retries: 0,
            retry_delay_ms: 0,
        };
        assert!(MediaWikiClient::new(config).is_err());
    }

    #[test]
    fn retryable_statuses_match_transient_server_errors() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }
}
