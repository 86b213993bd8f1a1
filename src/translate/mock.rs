//! Deterministic, network-free translator for tests and dry runs.
//!
//! Responses are looked up per source text: scripted one-shot responses are
//! consumed first, then fixed translations, then the fallback.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{TranslateError, TranslateRequest, Translator};

/// What to answer for a text with no script.
#[derive(Debug, Clone)]
pub enum Fallback {
    /// Prepend a marker: "Hello" → "KO:Hello". Keeps every token intact.
    Prefix(String),
    /// Return the source unchanged.
    Echo,
    Fail(TranslateError),
}

#[derive(Debug)]
pub struct ScriptedTranslator {
    scripted: Mutex<HashMap<String, VecDeque<Result<String, TranslateError>>>>,
    fixed: HashMap<String, String>,
    fallback: Fallback,
    delay: Duration,
    calls: Mutex<Vec<TranslateRequest>>,
}

impl ScriptedTranslator {
    pub fn new(fallback: Fallback) -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            fixed: HashMap::new(),
            fallback,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Prefix fallback with `marker`.
    pub fn prefixing(marker: &str) -> Self {
        Self::new(Fallback::Prefix(marker.to_string()))
    }

    /// Always translate `source` as `target`.
    pub fn with_translation(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.fixed.insert(source.into(), target.into());
        self
    }

    /// Queue a one-shot response for `source`; queued responses are used in order.
    pub fn with_response(self, source: impl Into<String>, response: Result<String, TranslateError>) -> Self {
        self.scripted
            .lock()
            .entry(source.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Simulated service latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<TranslateRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn translate(&self, request: &TranslateRequest) -> Result<String, TranslateError> {
        self.calls.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .get_mut(&request.text)
            .and_then(VecDeque::pop_front);
        if let Some(response) = scripted {
            return response;
        }
        if let Some(fixed) = self.fixed.get(&request.text) {
            return Ok(fixed.clone());
        }
        match &self.fallback {
            Fallback::Prefix(marker) => Ok(format!("{marker}{}", request.text)),
            Fallback::Echo => Ok(request.text.clone()),
            Fallback::Fail(err) => Err(err.clone()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GameDomain, TargetLanguage};

    fn request(text: &str) -> TranslateRequest {
        TranslateRequest::new("key", text, GameDomain::Stellaris, TargetLanguage::Korean)
    }

    #[tokio::test]
    async fn test_scripted_then_fixed_then_fallback() {
        let mock = ScriptedTranslator::prefixing("KO:")
            .with_translation("Hello", "안녕")
            .with_response("Hello", Err(TranslateError::Transient("503".into())));

        assert!(mock.translate(&request("Hello")).await.is_err());
        assert_eq!(mock.translate(&request("Hello")).await.unwrap(), "안녕");
        assert_eq!(mock.translate(&request("Bye")).await.unwrap(), "KO:Bye");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_fallback() {
        let mock = ScriptedTranslator::new(Fallback::Fail(TranslateError::ContentRefused("no".into())));
        assert_eq!(
            mock.translate(&request("x")).await,
            Err(TranslateError::ContentRefused("no".into()))
        );
    }
}
