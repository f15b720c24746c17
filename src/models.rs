use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const AESTHETIC_KEY: &str = "aesthetic";
pub const TAGS_KEY: &str = "tags";
pub const CAPTIONS_KEY: &str = "captions";

/// Tasks requested when the caller does not pick any.
pub const DEFAULT_TASKS: [AnalysisTask; 2] = [AnalysisTask::Tags, AnalysisTask::AestheticScore];

/// Bearer credential returned by the token endpoint.
///
/// Tokens are valid for roughly 72 hours. Nothing here tracks that; call
/// `connect` again to replace it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub scheme: String,
    pub token: String,
}

impl Credential {
    pub fn new(scheme: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            token: token.into(),
        }
    }

    /// Value for the `Authorization` header, e.g. `Bearer abc123`.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.scheme, self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("scheme", &self.scheme)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisTask {
    Tags,
    Captions,
    AestheticScore,
    /// Local marker: personalized scores are fetched with separate requests,
    /// one per registered model.
    CustomEndpoints,
}

impl AnalysisTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisTask::Tags => "TAGS",
            AnalysisTask::Captions => "CAPTIONS",
            AnalysisTask::AestheticScore => "AESTHETIC_SCORE",
            AnalysisTask::CustomEndpoints => "CUSTOM_ENDPOINTS",
        }
    }

    /// Wire task for the analyze payload. `None` for tasks that are never sent.
    pub fn to_task_spec(self) -> Option<TaskSpec> {
        match self {
            AnalysisTask::Tags => Some(TaskSpec::Tags),
            AnalysisTask::Captions => Some(TaskSpec::Captions),
            AnalysisTask::AestheticScore => Some(TaskSpec::AestheticScore),
            AnalysisTask::CustomEndpoints => None,
        }
    }

    /// Parse task names, silently dropping anything unrecognized.
    pub fn parse_lenient<I, S>(names: I) -> Vec<AnalysisTask>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| match name.as_ref().parse::<AnalysisTask>() {
                Ok(task) => Some(task),
                Err(e) => {
                    debug!("Dropping task: {}", e);
                    None
                }
            })
            .collect()
    }
}

impl fmt::Display for AnalysisTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TAGS" => Ok(AnalysisTask::Tags),
            "CAPTIONS" => Ok(AnalysisTask::Captions),
            "AESTHETIC_SCORE" | "AESTHETIC" => Ok(AnalysisTask::AestheticScore),
            "CUSTOM_ENDPOINTS" => Ok(AnalysisTask::CustomEndpoints),
            other => Err(format!("unrecognized analysis task: {other}")),
        }
    }
}

/// Image reference sent with every analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Url(String),
    /// Standard base64 of the raw image bytes.
    Content(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskSpec {
    Tags,
    Captions,
    AestheticScore,
    PersonalizedScore {
        #[serde(rename = "modelId")]
        model_id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct AnalyzeRequest {
    pub requests: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
pub struct ImageRequest {
    pub tasks: Vec<TaskSpec>,
    pub image: ImageSource,
}

impl AnalyzeRequest {
    pub fn single(image: ImageSource, tasks: Vec<TaskSpec>) -> Self {
        Self {
            requests: vec![ImageRequest { tasks, image }],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeResponse {
    pub responses: Vec<ImageResponse>,
}

/// One entry of `responses`. Fields are kept loose so that shape problems can
/// be reported with the offending key.
///
/// A key present with `null` is `Some(Value::Null)`; only a missing key is `None`.
#[derive(Debug, Default, Deserialize)]
pub struct ImageResponse {
    #[serde(default, deserialize_with = "present")]
    pub aesthetic_score: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub tags: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub captions: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub personalized_scores: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisValue {
    Score(f64),
    /// A response structure serialized back to a JSON string.
    Json(String),
}

impl AnalysisValue {
    pub fn as_score(&self) -> Option<f64> {
        match self {
            AnalysisValue::Score(score) => Some(*score),
            AnalysisValue::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&str> {
        match self {
            AnalysisValue::Json(json) => Some(json),
            AnalysisValue::Score(_) => None,
        }
    }
}

/// Flat result of an analysis: `aesthetic`, `tags`, `captions` and one score
/// per custom model name, each only when the API supplied it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnalysisResult {
    entries: BTreeMap<String, AnalysisValue>,
}

impl AnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: AnalysisValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&AnalysisValue> {
        self.entries.get(key)
    }

    pub fn score(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(AnalysisValue::as_score)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge custom model scores, keeping any existing entry on a name clash.
    /// Returns the names that were skipped.
    pub fn merge_scores(&mut self, scores: BTreeMap<String, f64>) -> Vec<String> {
        let mut skipped = Vec::new();
        for (name, score) in scores {
            if self.entries.contains_key(&name) {
                skipped.push(name);
            } else {
                self.entries.insert(name, AnalysisValue::Score(score));
            }
        }
        skipped
    }
}

/// Local model name -> remote personalized model id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomEndpointRegistry {
    models: BTreeMap<String, String>,
}

impl CustomEndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, returning the id previously bound to `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Option<String> {
        self.models.insert(name.into(), model_id.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.models.remove(name)
    }

    pub fn model_id(&self, name: &str) -> Option<&str> {
        self.models.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.models
            .iter()
            .map(|(name, id)| (name.as_str(), id.as_str()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl<N: Into<String>, I: Into<String>> FromIterator<(N, I)> for CustomEndpointRegistry {
    fn from_iter<T: IntoIterator<Item = (N, I)>>(iter: T) -> Self {
        let mut registry = Self::new();
        for (name, id) in iter {
            registry.register(name, id);
        }
        registry
    }
}
