//! External text-generation services: the entity tagger and the pseudonym
//! generator.
//!
//! Both are traits with a single request/response method so the pipeline can
//! run against deterministic stand-ins. [`OpenAiClient`] implements both over
//! an OpenAI-compatible chat completions endpoint.

use crate::mapping::PseudonymResponse;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Which tag shape the tagger should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStyle {
    /// `<to_pseudonym>...</to_pseudonym>`
    Plain,
    /// `<to_pseudonym type="PER|LOC|ORG|MISC">...</to_pseudonym>`
    Categorized,
}

const PLAIN_EXAMPLE: &str = "<to_pseudonym>Maria Rossi</to_pseudonym> joined \
<to_pseudonym>Northwind Labs</to_pseudonym> in <to_pseudonym>Turin</to_pseudonym> to lead \
the <to_pseudonym>Falcon</to_pseudonym> project.";

const CATEGORIZED_EXAMPLE: &str = "<to_pseudonym type=\"PER\">Maria Rossi</to_pseudonym> joined \
<to_pseudonym type=\"ORG\">Northwind Labs</to_pseudonym> in \
<to_pseudonym type=\"LOC\">Turin</to_pseudonym> to lead the \
<to_pseudonym type=\"MISC\">Falcon</to_pseudonym> project.";

/// Built-in tagged example used when no example file is given.
pub fn default_example(style: TagStyle) -> &'static str {
    match style {
        TagStyle::Plain => PLAIN_EXAMPLE,
        TagStyle::Categorized => CATEGORIZED_EXAMPLE,
    }
}

/// Wraps PII spans of a raw document in `<to_pseudonym>` tags.
pub trait EntityTagger: Send + Sync {
    /// `example` is an already-tagged document shown to the tagger as a
    /// reference.
    fn tag(&self, text: &str, example: &str, style: TagStyle) -> Result<String>;
}

/// Proposes a pseudonym for each entity.
///
/// The response is untrusted; it only becomes usable after conversion into an
/// [`EntityPseudonymMapping`](crate::mapping::EntityPseudonymMapping).
pub trait PseudonymGenerator: Send + Sync {
    fn generate(&self, entities: &[String]) -> Result<PseudonymResponse>;
}

/// Connection settings for [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            temperature: 1.0,
            max_tokens: 5079,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// JSON schema constraining the pseudonym response to two string arrays.
fn pseudonym_schema() -> serde_json::Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "pseudonyms",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "PII": { "type": "array", "items": { "type": "string" } },
                    "pseudonym": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["PII", "pseudonym"],
                "additionalProperties": false
            }
        }
    })
}

fn tagging_instruction(style: TagStyle) -> &'static str {
    match style {
        TagStyle::Plain => {
            "Annotate all Personally Identifiable Information in the following text \
             (e.g., names, places, organizations, project names, etc.). \
             Use the tags <to_pseudonym> </to_pseudonym> to tag them. Do not use different tags. \
             Just output the tagged text, without any further comment. Do not change the original text."
        }
        TagStyle::Categorized => {
            "Annotate all Personally Identifiable Information in the following text. \
             Wrap each span as <to_pseudonym type=\"CATEGORY\">span</to_pseudonym> where CATEGORY is \
             PER for people, LOC for places, ORG for organizations and MISC for anything else \
             (e.g., project names). Do not use different tags or categories. \
             Just output the tagged text, without any further comment. Do not change the original text."
        }
    }
}

fn pseudonym_instruction(entities: &[String]) -> Result<String> {
    let list = serde_json::to_string(entities).context("Failed to encode entity list")?;
    Ok(format!(
        "Generate a pseudonym for each of the following entities. Each pseudonym must be \
         context-appropriate: keep the kind of entity, its tone, cultural register and, where \
         possible, its number of words. Different entities must get different pseudonyms. \
         Answer with a JSON object with two arrays of the same length: \"PII\" repeating the \
         entities in the given order, and \"pseudonym\" with the corresponding pseudonyms.\n\n\
         Entities: {}",
        list
    ))
}

/// Blocking client for an OpenAI-compatible chat completions API.
pub struct OpenAiClient {
    config: LlmConfig,
    http: reqwest::blocking::Client,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            anyhow::bail!("No API key configured (set OPENAI_API_KEY or pass --api-key)");
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, http })
    }

    fn chat(&self, messages: Vec<Message>, response_format: Option<serde_json::Value>) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format,
        };

        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .with_context(|| format!("Failed to send chat request to {}", url))?;

        let status = response.status();
        let body = response.text().context("Failed to read chat response")?;
        if !status.is_success() {
            anyhow::bail!("Chat request failed with status {}: {}", status, body);
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).context("Failed to parse chat response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .context("No choices in chat response")?
            .message
            .content
            .context("No content in chat response")
    }
}

impl EntityTagger for OpenAiClient {
    fn tag(&self, text: &str, example: &str, style: TagStyle) -> Result<String> {
        let messages = vec![
            Message::new("user", tagging_instruction(style)),
            Message::new("assistant", example),
            Message::new(
                "user",
                format!(
                    "Do the same on the following text. Just tag the text: do not change the original text.\n\nText:{}",
                    text
                ),
            ),
        ];
        self.chat(messages, None)
    }
}

impl PseudonymGenerator for OpenAiClient {
    fn generate(&self, entities: &[String]) -> Result<PseudonymResponse> {
        let messages = vec![Message::new("user", pseudonym_instruction(entities)?)];
        let content = self.chat(messages, Some(pseudonym_schema()))?;
        Ok(PseudonymResponse::from_json(&content)?)
    }
}

/// Generator answering from a fixed table, for offline runs and tests.
///
/// Entities missing from the table are omitted from the response, which the
/// pipeline then reports as unreplaced.
#[derive(Debug, Clone, Default)]
pub struct StaticPseudonyms {
    table: HashMap<String, String>,
}

impl StaticPseudonyms {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            table: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load a table from a file with one `entity=pseudonym` pair per line.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pseudonym table: {}", path.display()))?;
        let pairs = content
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (entity, pseudonym) = line.split_once('=')?;
                let entity = entity.trim();
                (!entity.is_empty()).then(|| (entity.to_string(), pseudonym.trim().to_string()))
            });
        Ok(Self::new(pairs))
    }
}

impl PseudonymGenerator for StaticPseudonyms {
    fn generate(&self, entities: &[String]) -> Result<PseudonymResponse> {
        let (pii, pseudonym) = entities
            .iter()
            .filter_map(|e| self.table.get(e).map(|p| (e.clone(), p.clone())))
            .unzip();
        Ok(PseudonymResponse { pii, pseudonym })
    }
}
