//! Mock model provider for testing.
//!
//! [`MockModel`] replays scripted [`ModelResponse`]s in order and records
//! every request it receives, so agent behavior can be tested without a
//! network or a real provider.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{ModelProvider, ModelRequest, ModelResponse};
use crate::error::{Error, Result};

/// A scripted model provider.
///
/// Responses are consumed front-to-back, one per request; running out of
/// scripted responses is a configuration error, which keeps a test from
/// silently looping.
#[derive(Debug, Default)]
pub struct MockModel {
    responses: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockModel {
    /// Create a mock that replays the given responses in order.
    #[must_use]
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append another scripted response.
    pub fn push_response(&self, response: ModelResponse) {
        if let Ok(mut guard) = self.responses.lock() {
            guard.push_back(response);
        }
    }

    /// The requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of scripted responses not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|g| g.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelProvider for MockModel {
    async fn get_response(&self, request: &ModelRequest) -> Result<ModelResponse> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut guard| guard.pop_front());
        next.ok_or_else(|| {
            Error::configuration("MockModel has no scripted response left for this request")
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ModelSettings;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "mock-1".into(),
            system_instructions: None,
            original_input: "hi".into(),
            items: Vec::new(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            output_schema: None,
            settings: ModelSettings::default(),
        }
    }

    #[tokio::test]
    async fn replays_responses_in_order() {
        let mock = MockModel::new(vec![ModelResponse::text("one"), ModelResponse::text("two")]);

        let first = mock.get_response(&request()).await.unwrap();
        let second = mock.get_response(&request()).await.unwrap();
        assert_eq!(first.message_text(), Some("one"));
        assert_eq!(second.message_text(), Some("two"));
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn errors_when_exhausted() {
        let mock = MockModel::new(Vec::new());
        let err = mock.get_response(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn pushed_responses_extend_the_script() {
        let mock = MockModel::new(vec![ModelResponse::text("one")]);
        mock.push_response(ModelResponse::text("two"));
        assert_eq!(mock.remaining(), 2);

        mock.get_response(&request()).await.unwrap();
        let second = mock.get_response(&request()).await.unwrap();
        assert_eq!(second.message_text(), Some("two"));
    }

    #[tokio::test]
    async fn records_requests() {
        let mock = MockModel::new(vec![ModelResponse::text("ok")]);
        mock.get_response(&request()).await.unwrap();
        let seen = mock.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].original_input, "hi");
    }
}
