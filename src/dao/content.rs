//! Read-only client for the quiz CRUD backend: quiz metadata, ordered
//! questions with options, and user identity resolution.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;

use crate::dao::storage::{StorageError, StorageResult};

/// Quiz metadata as exposed by the content backend.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizInfo {
    /// Primary key of the quiz.
    pub id: i64,
    /// Display title.
    pub title: String,
    /// Per-question time limit in seconds, when the quiz overrides the default.
    #[serde(rename = "timeLimit")]
    pub time_limit_seconds: Option<u32>,
    /// Whether the quiz is currently playable.
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

/// Identity record returned by the user service.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    /// Primary key of the user.
    pub id: i64,
    /// Login/handle.
    pub username: String,
    /// Optional given name.
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    /// Optional family name.
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
    /// Whether the account is active.
    #[serde(rename = "isActive", default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl UserInfo {
    /// Human-facing name: "First Last" when both parts exist, username otherwise.
    pub fn display_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.to_string(),
            _ => self.username.clone(),
        }
    }
}

/// Question payload as authored, correctness flags included.
///
/// This shape is server-side only; converting to a client-facing view must go
/// through the sanitized projection in the session model.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionEntity {
    /// Primary key of the question.
    pub id: i64,
    /// Question text.
    pub text: String,
    /// Authoring difficulty ("easy" / "medium" / "hard").
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Answer options in authored order.
    pub options: Vec<QuestionOptionEntity>,
    /// Base points awarded for a correct answer.
    #[serde(rename = "pointValue")]
    pub point_value: Option<u32>,
}

/// A single answer option with its correctness flag.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionOptionEntity {
    /// Primary key of the option.
    pub id: i64,
    /// Option text.
    pub text: String,
    /// Whether this option is part of the correct answer set.
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
}

/// Abstraction over the quiz content and identity backend.
pub trait ContentSource: Send + Sync {
    /// Look up quiz metadata by id.
    fn find_quiz(&self, quiz_id: i64) -> BoxFuture<'static, StorageResult<Option<QuizInfo>>>;
    /// Fetch the ordered question list for a quiz. An empty list is a valid
    /// result, never an error.
    fn load_questions(&self, quiz_id: i64)
    -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
    /// Look up a user by id.
    fn find_user(&self, user_id: i64) -> BoxFuture<'static, StorageResult<Option<UserInfo>>>;
    /// Resolve a signed auth token into the user it identifies.
    fn resolve_token(&self, token: String) -> BoxFuture<'static, StorageResult<Option<UserInfo>>>;
}

/// Connection settings for [`HttpContentSource`].
#[derive(Debug, Clone)]
pub struct ContentConfig {
    /// Base URL of the CRUD backend, e.g. `http://localhost:3000/api`.
    pub base_url: String,
    /// Optional bearer token for service-to-service calls.
    pub service_token: Option<String>,
}

/// HTTP implementation of [`ContentSource`] against the CRUD backend.
#[derive(Clone)]
pub struct HttpContentSource {
    client: Client,
    base_url: Arc<str>,
    service_token: Option<Arc<str>>,
}

impl HttpContentSource {
    /// Build a client for the configured backend.
    pub fn new(config: ContentConfig) -> StorageResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| StorageError::unavailable("building HTTP client".into(), source))?;

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            service_token: config.service_token.map(Arc::from),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.service_token {
            Some(token) => builder.bearer_auth(token.as_ref()),
            None => builder,
        }
    }

    async fn get_json<T>(&self, path: String) -> StorageResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .request(Method::GET, &path)
            .send()
            .await
            .map_err(|source| StorageError::unavailable(format!("GET {path}"), source))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let value = response
                    .json::<T>()
                    .await
                    .map_err(|source| StorageError::decode(format!("GET {path}"), source))?;
                Ok(Some(value))
            }
            status => Err(StorageError::unavailable(
                format!("GET {path} returned {status}"),
                UnexpectedStatus(status),
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected status {0}")]
struct UnexpectedStatus(StatusCode);

impl ContentSource for HttpContentSource {
    fn find_quiz(&self, quiz_id: i64) -> BoxFuture<'static, StorageResult<Option<QuizInfo>>> {
        let this = self.clone();
        Box::pin(async move { this.get_json(format!("quizzes/{quiz_id}")).await })
    }

    fn load_questions(
        &self,
        quiz_id: i64,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let this = self.clone();
        Box::pin(async move {
            let questions = this
                .get_json::<Vec<QuestionEntity>>(format!("quizzes/{quiz_id}/questions"))
                .await?;
            Ok(questions.unwrap_or_default())
        })
    }

    fn find_user(&self, user_id: i64) -> BoxFuture<'static, StorageResult<Option<UserInfo>>> {
        let this = self.clone();
        Box::pin(async move { this.get_json(format!("users/{user_id}")).await })
    }

    fn resolve_token(&self, token: String) -> BoxFuture<'static, StorageResult<Option<UserInfo>>> {
        let this = self.clone();
        Box::pin(async move {
            let response = this
                .request(Method::GET, "auth/me")
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|source| StorageError::unavailable("GET auth/me".into(), source))?;

            match response.status() {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                    Ok(None)
                }
                status if status.is_success() => {
                    let user = response
                        .json::<UserInfo>()
                        .await
                        .map_err(|source| StorageError::decode("GET auth/me".into(), source))?;
                    Ok(Some(user))
                }
                status => Err(StorageError::unavailable(
                    format!("GET auth/me returned {status}"),
                    UnexpectedStatus(status),
                )),
            }
        })
    }
}
