use crate::config::ServiceConfig;
use crate::error::{ExamError, Result};
use crate::exam::Question;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::messages::{ErrorPayload, QuestionList};

/// Source of exam questions
#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    async fn fetch(&self, question_id: &str) -> Result<Question>;

    async fn list(&self) -> Result<Vec<Question>>;
}

/// Question catalog served over HTTP
pub struct HttpQuestionCatalog {
    client: reqwest::Client,
    service: ServiceConfig,
}

impl HttpQuestionCatalog {
    pub fn new(service: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(service.request_timeout())
            .build()
            .map_err(|e| ExamError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            service: service.clone(),
        })
    }

    /// `/questions/{id}` with the id kept as a single path segment
    fn question_url(&self, question_id: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.service.resolve("/questions/")).map_err(|e| {
            ExamError::QuestionLoadError(format!("Invalid catalog URL: {}", e))
        })?;
        url.path_segments_mut()
            .map_err(|_| ExamError::QuestionLoadError("Catalog URL cannot take a path".to_string()))?
            .pop_if_empty()
            .push(question_id);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            ExamError::QuestionLoadError(format!("Failed to reach question catalog: {}", e))
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            ExamError::QuestionLoadError(format!("Failed to read catalog response: {}", e))
        })?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorPayload>(&body)
                .map(|p| p.message())
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(ExamError::QuestionLoadError(detail));
        }

        serde_json::from_slice(&body).map_err(|e| {
            ExamError::QuestionLoadError(format!("Malformed catalog response: {}", e))
        })
    }
}

#[async_trait]
impl QuestionCatalog for HttpQuestionCatalog {
    async fn fetch(&self, question_id: &str) -> Result<Question> {
        let url = self.question_url(question_id)?;
        let question: Question = self.get_json(url.as_str()).await?;
        question.validate()?;
        info!("Fetched question {} (part {})", question.id, question.part);
        Ok(question)
    }

    async fn list(&self) -> Result<Vec<Question>> {
        let list: QuestionList = self.get_json(&self.service.resolve("/questions/")).await?;
        info!("Catalog lists {} questions", list.total);
        Ok(list.questions)
    }
}
