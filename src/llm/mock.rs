//! Scripted LLM double for tests and offline runs.
//!
//! Replies are served from a queue in call order, or computed by a handler
//! when one is installed. Every call is recorded so tests can assert on
//! stage order, capability and prompts.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::LlmError;

use super::{LlmClient, Response, ResponseRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Chat,
    Respond,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub kind: CallKind,
    /// Model of a respond call; `None` for chat.
    pub model: Option<String>,
    pub system: String,
    pub user: String,
    pub web_search: bool,
    pub request: Option<ResponseRequest>,
}

type Handler = dyn Fn(&MockCall) -> Result<String, LlmError> + Send + Sync;

#[derive(Default)]
pub struct MockLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    handler: Option<Arc<Handler>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue of replies served in call order.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for r in replies {
            mock.push_reply(r);
        }
        mock
    }

    /// Compute every reply from the call itself (queue is ignored).
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&MockCall) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::default()
        }
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.replies.lock().push_back(Ok(text.into()));
    }

    pub fn push_error(&self, err: LlmError) {
        self.replies.lock().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn answer(&self, call: MockCall) -> Result<String, LlmError> {
        let out = match &self.handler {
            Some(h) => h(&call),
            None => self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::InvalidResponse("mock reply queue exhausted".into()))),
        };
        self.calls.lock().push(call);
        out
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.answer(MockCall {
            kind: CallKind::Chat,
            model: None,
            system: system.to_string(),
            user: user.to_string(),
            web_search: false,
            request: None,
        })
    }

    async fn respond(&self, request: &ResponseRequest) -> Result<Response, LlmError> {
        let text = self.answer(MockCall {
            kind: CallKind::Respond,
            model: Some(request.model.clone()),
            system: request.input_text("system").unwrap_or_default().to_string(),
            user: request.input_text("user").unwrap_or_default().to_string(),
            web_search: request.uses_web_search(),
            request: Some(request.clone()),
        })?;
        Ok(Response::from_text(text))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Capability, ProfileBuilder};

    #[tokio::test]
    async fn replies_are_served_in_order_and_recorded() {
        let mock = MockLlm::with_replies(["one", "two"]);
        assert_eq!(mock.chat("s", "u").await.unwrap(), "one");
        let req = ProfileBuilder::default().request(Capability::Find, "sys", "usr");
        let resp = mock.respond(&req).await.unwrap();
        assert_eq!(resp.first_message_text().unwrap(), "two");
        assert!(mock.chat("s", "u").await.is_err());

        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].kind, CallKind::Respond);
        assert_eq!(calls[1].user, "usr");
        assert!(calls[1].web_search);
    }
}
