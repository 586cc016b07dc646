//! Scenario execution
//!
//! A [`ScenarioContext`] holds everything one scenario's steps share: the
//! variable store, header templates, the last response and the last command
//! result. A fresh context is built for every scenario, so scenarios running
//! in parallel never see each other's variables.
//!
//! Step operations live on the context (see `steps.rs`); [`StepRegistry`]
//! maps step sentences onto them, and [`run_scenario`] drives a list of
//! steps to the first failure.

pub mod registry;
mod steps;

pub use registry::{StepAction, StepRegistry};

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use reqwest::Client;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{Result, StepError};
use crate::fake::{FakeGenerator, TagGenerator};
use crate::json;
use crate::process::CommandResult;
use crate::store::VariableStore;
use crate::template;

/// Header name to value template. Values are resolved on every request.
#[derive(Debug, Clone, Default)]
pub struct HeaderSet {
    templates: IndexMap<String, String>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(name.into(), template.into());
    }

    /// Raw template stored for a header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.templates.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Resolve every template against the current store
    pub fn resolve(&self, store: &VariableStore) -> Vec<(String, String)> {
        self.templates
            .iter()
            .map(|(name, value)| (name.clone(), template::resolve(value, store)))
            .collect()
    }
}

impl From<IndexMap<String, String>> for HeaderSet {
    fn from(templates: IndexMap<String, String>) -> Self {
        Self { templates }
    }
}

/// Status and body of the most recent response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub body: String,
}

impl ResponseSnapshot {
    /// Parse the body as JSON
    pub fn json(&self) -> Result<JsonValue> {
        json::parse_body(&self.body)
    }

    /// Look up a property path in the body. A body that is not JSON has no
    /// properties.
    pub fn property(&self, path: &str) -> Option<JsonValue> {
        let body = json::parse_body(&self.body).ok()?;
        json::lookup(&body, path)
    }
}

/// State shared by the steps of one scenario
pub struct ScenarioContext {
    store: VariableStore,
    headers: HeaderSet,
    response: Option<ResponseSnapshot>,
    command: Option<CommandResult>,
    base_url: String,
    client: Client,
    generator: Arc<dyn FakeGenerator>,
    command_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("store", &self.store)
            .field("headers", &self.headers)
            .field("response", &self.response)
            .field("command", &self.command)
            .field("base_url", &self.base_url)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl ScenarioContext {
    /// Create a context with an empty store and the configured default headers
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().build()?;

        Ok(Self {
            store: VariableStore::new(),
            headers: HeaderSet::from(config.default_headers.clone()),
            response: None,
            command: None,
            base_url: config.base_url.clone(),
            client,
            generator: Arc::new(TagGenerator),
            command_timeout: config.command_timeout,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the fake data generator
    pub fn with_generator(mut self, generator: impl FakeGenerator + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    /// Token that aborts running commands when cancelled
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut VariableStore {
        &mut self.store
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn response(&self) -> Option<&ResponseSnapshot> {
        self.response.as_ref()
    }

    /// Result of the last command, kept even when the command failed
    pub fn last_command(&self) -> Option<&CommandResult> {
        self.command.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn require_response(&self) -> Result<&ResponseSnapshot> {
        self.response.as_ref().ok_or(StepError::NoResponse)
    }

    /// Run steps in order, stopping at the first failure
    pub async fn run_steps(&mut self, registry: &StepRegistry, steps: &[Step]) -> ScenarioOutcome {
        for (index, step) in steps.iter().enumerate() {
            if let Err(error) = registry.execute(self, step).await {
                warn!(step = index + 1, sentence = %step.sentence, error = %error, "Step failed");
                return ScenarioOutcome {
                    steps_run: index + 1,
                    failure: Some(StepFailure {
                        index,
                        sentence: step.sentence.clone(),
                        error,
                    }),
                };
            }
        }

        info!(steps = steps.len(), "Scenario passed");
        ScenarioOutcome { steps_run: steps.len(), failure: None }
    }
}

/// One step sentence with its optional doc string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub sentence: String,
    pub docstring: Option<String>,
}

impl Step {
    pub fn new(sentence: impl Into<String>) -> Self {
        Self { sentence: sentence.into(), docstring: None }
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }
}

/// The step that ended a scenario
#[derive(Debug)]
pub struct StepFailure {
    /// Zero-based position of the step
    pub index: usize,
    pub sentence: String,
    pub error: StepError,
}

/// Result of running a scenario
#[derive(Debug)]
pub struct ScenarioOutcome {
    /// Steps attempted, including a failed one
    pub steps_run: usize,
    pub failure: Option<StepFailure>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    /// The failing step's error, if any
    pub fn into_result(self) -> Result<()> {
        match self.failure {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }
}

/// Run steps on a fresh context built from `config`
pub async fn run_scenario(config: &Config, steps: &[Step]) -> Result<ScenarioOutcome> {
    let mut context = ScenarioContext::new(config)?;
    let registry = StepRegistry::new();
    Ok(context.run_steps(&registry, steps).await)
}
