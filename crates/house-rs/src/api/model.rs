//! The model-call seam.

use crate::{ChatCompletion, ChatRequest, OpenRouterClient};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`ModelClient::complete`].
pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<ChatCompletion, String>> + Send + 'a>>;

/// Anything that can answer a chat completion request.
///
/// Errors are plain strings in the same format the HTTP client produces
/// (`"OpenRouter API HTTP 503: ..."`, `"request failed: ..."`) so that
/// [`retry::is_transient_error`](super::retry::is_transient_error) can
/// classify them.
pub trait ModelClient: Send + Sync {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ModelFuture<'a>;
}

impl ModelClient for OpenRouterClient {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ModelFuture<'a> {
        Box::pin(self.chat(request))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted model client shared by orchestrator, spawner and classifier tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed queue of responses and records every request.
    pub(crate) struct ScriptedClient {
        responses: Mutex<VecDeque<Result<ChatCompletion, String>>>,
        pub(crate) requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        pub(crate) fn new(responses: Vec<Result<ChatCompletion, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl ModelClient for ScriptedClient {
        fn complete<'a>(&'a self, request: &'a ChatRequest) -> ModelFuture<'a> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatCompletion::text("(script exhausted)")));
            Box::pin(async move { next })
        }
    }
}
