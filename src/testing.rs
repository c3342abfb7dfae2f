//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::ModelError;
use crate::gemini::{GenerativeModel, ModelRequest};

/// Replays canned responses in order and records every request.
/// Once the script is exhausted it answers with an empty body.
/// A gated model holds every reply until `release` lets it through.
#[derive(Default)]
pub struct ScriptedModel {
  script: Mutex<VecDeque<Result<String, ModelError>>>,
  requests: Mutex<Vec<ModelRequest>>,
  gate: Option<Semaphore>,
}

impl ScriptedModel {
  pub fn new(script: impl IntoIterator<Item = Result<String, ModelError>>) -> Arc<Self> {
    Arc::new(Self {
      script: Mutex::new(script.into_iter().collect()),
      requests: Mutex::new(Vec::new()),
      gate: None,
    })
  }

  pub fn gated(script: impl IntoIterator<Item = Result<String, ModelError>>) -> Arc<Self> {
    Arc::new(Self {
      script: Mutex::new(script.into_iter().collect()),
      requests: Mutex::new(Vec::new()),
      gate: Some(Semaphore::new(0)),
    })
  }

  /// Let `n` more replies through a gated model.
  pub fn release(&self, n: usize) {
    if let Some(gate) = &self.gate {
      gate.add_permits(n);
    }
  }

  pub fn last_request(&self) -> Option<ModelRequest> {
    self.requests.lock().expect("requests lock").last().cloned()
  }

  pub fn request_count(&self) -> usize {
    self.requests.lock().expect("requests lock").len()
  }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
  async fn generate(&self, _api_key: &str, request: ModelRequest) -> Result<String, ModelError> {
    self.requests.lock().expect("requests lock").push(request);
    if let Some(gate) = &self.gate {
      gate.acquire().await.expect("gate open").forget();
    }
    self.script
      .lock()
      .expect("script lock")
      .pop_front()
      .unwrap_or_else(|| Ok(String::new()))
  }
}
