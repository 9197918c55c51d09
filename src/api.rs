//! REST client for the issuedesk backend.
//!
//! Every call carries the bearer token when one is set. HTTP 401 becomes
//! [`ClientError::Unauthorized`] and is never retried; other failures carry
//! the backend's `error` or `detail` text.

use async_trait::async_trait;
use issuedesk_common::{
    AuthToken, Branch, ContextCard, CreatedIssue, FileDependency, LoginUrl, Message,
    NewContextCard, RepoSummary, Repository, RunTrajectory, Session, SessionPatch, SolveSession,
    StartSolveRequest, UserProfile,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ServerConfig;
use crate::errors::ClientError;
use crate::session::ChatBackend;
use crate::trajectory::TrajectorySource;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ServerConfig, token: Option<String>) -> Result<Self, ClientError> {
        let base = config.api_url.trim_end_matches('/').to_string();
        Url::parse(&base).map_err(|_| ClientError::InvalidUrl(config.api_url.clone()))?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("issuedesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ClientError::Transport {
                url: base.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base,
            token,
            timeout: config.request_timeout(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    // ── Auth ─────────────────────────────────────────────────────────

    pub async fn login_url(&self) -> Result<LoginUrl, ClientError> {
        self.get(&["auth", "login"]).await
    }

    /// Exchange the OAuth callback code for a bearer token.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> Result<AuthToken, ClientError> {
        self.post(&["auth", "callback"], &json!({ "code": code, "state": state }))
            .await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.execute_empty(Method::POST, &["auth", "logout"]).await
    }

    pub async fn profile(&self) -> Result<UserProfile, ClientError> {
        self.get(&["auth", "profile"]).await
    }

    // ── Repositories ─────────────────────────────────────────────────

    pub async fn list_repos(&self) -> Result<Vec<RepoSummary>, ClientError> {
        self.get(&["repos"]).await
    }

    pub async fn list_branches(&self, owner: &str, name: &str) -> Result<Vec<Branch>, ClientError> {
        self.get(&["repos", owner, name, "branches"]).await
    }

    // ── Sessions ─────────────────────────────────────────────────────

    pub async fn create_session(
        &self,
        repository: &Repository,
        title: Option<&str>,
    ) -> Result<Session, ClientError> {
        self.post(
            &["sessions"],
            &json!({ "repository": repository, "title": title }),
        )
        .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        self.get(&["sessions"]).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session, ClientError> {
        self.get(&["sessions", session_id]).await
    }

    pub async fn update_session(
        &self,
        session_id: &str,
        patch: &SessionPatch,
    ) -> Result<Session, ClientError> {
        let url = self.url(&["sessions", session_id])?;
        self.execute(self.request(Method::PATCH, &url).json(patch), &url)
            .await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ClientError> {
        self.execute_empty(Method::DELETE, &["sessions", session_id])
            .await
    }

    // ── Messages ─────────────────────────────────────────────────────

    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, ClientError> {
        self.get(&["sessions", session_id, "messages"]).await
    }

    /// Post a user message. The backend stores it and echoes `client_id`
    /// on both the response and the realtime broadcast.
    pub async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        client_id: &str,
    ) -> Result<Message, ClientError> {
        self.post(
            &["sessions", session_id, "messages"],
            &json!({ "content": content, "client_id": client_id }),
        )
        .await
    }

    // ── Context cards ────────────────────────────────────────────────

    pub async fn list_context_cards(
        &self,
        session_id: &str,
    ) -> Result<Vec<ContextCard>, ClientError> {
        self.get(&["sessions", session_id, "context-cards"]).await
    }

    pub async fn add_context_card(
        &self,
        session_id: &str,
        card: &NewContextCard,
    ) -> Result<ContextCard, ClientError> {
        self.post(&["sessions", session_id, "context-cards"], card)
            .await
    }

    pub async fn remove_context_card(
        &self,
        session_id: &str,
        card_id: &str,
    ) -> Result<(), ClientError> {
        self.execute_empty(
            Method::DELETE,
            &["sessions", session_id, "context-cards", card_id],
        )
        .await
    }

    // ── File dependencies ────────────────────────────────────────────

    pub async fn extract_dependencies(
        &self,
        session_id: &str,
        file_paths: &[String],
    ) -> Result<Vec<FileDependency>, ClientError> {
        self.post(
            &["sessions", session_id, "dependencies", "extract"],
            &json!({ "file_paths": file_paths }),
        )
        .await
    }

    pub async fn list_dependencies(
        &self,
        session_id: &str,
    ) -> Result<Vec<FileDependency>, ClientError> {
        self.get(&["sessions", session_id, "dependencies"]).await
    }

    // ── Issues ───────────────────────────────────────────────────────

    /// Draft an issue from the session. With `push_to_github` the backend
    /// also opens it on GitHub and fills in the number and URL.
    pub async fn create_issue(
        &self,
        session_id: &str,
        push_to_github: bool,
    ) -> Result<CreatedIssue, ClientError> {
        self.post(
            &["sessions", session_id, "issues"],
            &json!({ "create_github_issue": push_to_github }),
        )
        .await
    }

    // ── Solve runs ───────────────────────────────────────────────────

    pub async fn start_solve(&self, request: &StartSolveRequest) -> Result<SolveSession, ClientError> {
        self.post(&["solve", "start"], request).await
    }

    pub async fn cancel_solve(&self, solve_id: &str) -> Result<(), ClientError> {
        self.execute_empty(Method::POST, &["solve", solve_id, "cancel"])
            .await
    }

    pub async fn solve_status(&self, solve_id: &str) -> Result<SolveSession, ClientError> {
        self.get(&["solve", solve_id, "status"]).await
    }

    pub async fn run_trajectory(
        &self,
        solve_id: &str,
        run_id: &str,
    ) -> Result<RunTrajectory, ClientError> {
        self.get(&["solve", solve_id, "runs", run_id, "trajectory"])
            .await
    }

    /// Open the run's SSE channel. The returned response has been status
    /// checked; its body is the event stream. No request timeout applies.
    pub async fn open_trajectory_stream(
        &self,
        solve_id: &str,
        run_id: &str,
    ) -> Result<Response, ClientError> {
        let url = self.url(&["solve", solve_id, "runs", run_id, "stream"])?;
        let mut builder = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        debug!(url = %url, "Opening trajectory stream");
        let response = builder
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;
        check(&url, response).await
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    /// Append `segments` to the base path. Each segment is percent-encoded,
    /// so an id can never add path components or a query.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let invalid = || ClientError::InvalidUrl(self.base.clone());
        let mut url = Url::parse(&self.base).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url.clone())
            .timeout(self.timeout);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let url = self.url(segments)?;
        self.execute(self.request(Method::GET, &url), &url).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.url(segments)?;
        self.execute(self.request(Method::POST, &url).json(body), &url)
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        url: &Url,
    ) -> Result<T, ClientError> {
        let response = self.dispatch(builder, url).await?;
        response.json::<T>().await.map_err(|source| ClientError::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn execute_empty(&self, method: Method, segments: &[&str]) -> Result<(), ClientError> {
        let url = self.url(segments)?;
        self.dispatch(self.request(method, &url), &url).await?;
        Ok(())
    }

    async fn dispatch(&self, builder: RequestBuilder, url: &Url) -> Result<Response, ClientError> {
        trace!(path = url.path(), "API request");
        let response = builder
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;
        check(url, response).await
    }
}

async fn check(url: &Url, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound {
            resource: url.path().to_string(),
        });
    }
    Err(ClientError::Status {
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

/// Pull a human message out of an error body: `{"error": ..}`,
/// `{"detail": ..}`, or the raw text.
pub fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail", "message"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                Some(serde_json::Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn post_message(
        &self,
        session_id: &str,
        content: &str,
        client_id: &str,
    ) -> Result<Message, ClientError> {
        self.send_message(session_id, content, client_id).await
    }
}

#[async_trait]
impl TrajectorySource for ApiClient {
    async fn fetch_trajectory(
        &self,
        solve_id: &str,
        run_id: &str,
    ) -> Result<RunTrajectory, ClientError> {
        self.run_trajectory(solve_id, run_id).await
    }
}
