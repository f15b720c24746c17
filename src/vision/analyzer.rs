use crate::models::{
    AnalysisResult, AnalysisTask, AnalysisValue, AnalyzeRequest, ImageResponse, ImageSource,
    TaskSpec, AESTHETIC_KEY, CAPTIONS_KEY, TAGS_KEY,
};
use crate::utils::encode_image_file;
use crate::vision::client::{VisionClient, VisionError};

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Build the analyze payload for the remote task kinds in `tasks`.
///
/// Order of first appearance is kept, duplicates are dropped and
/// `CUSTOM_ENDPOINTS` never reaches the wire.
pub fn build_analyze_request(image: &ImageSource, tasks: &[AnalysisTask]) -> AnalyzeRequest {
    let mut specs: Vec<TaskSpec> = Vec::with_capacity(tasks.len());
    for spec in tasks.iter().filter_map(|task| task.to_task_spec()) {
        if !specs.contains(&spec) {
            specs.push(spec);
        }
    }

    AnalyzeRequest::single(image.clone(), specs)
}

/// Flatten one analysis response. Absent fields are skipped; fields that are
/// present but malformed are errors.
pub fn extract_analysis(response: &ImageResponse) -> Result<AnalysisResult, VisionError> {
    let mut result = AnalysisResult::new();

    if let Some(aesthetic) = &response.aesthetic_score {
        let score = aesthetic
            .get("score")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                VisionError::ResponseFormat("'aesthetic_score.score' is not a number".to_string())
            })?;
        result.insert(AESTHETIC_KEY, AnalysisValue::Score(score));
    }

    if let Some(tags) = &response.tags {
        result.insert(TAGS_KEY, AnalysisValue::Json(serde_json::to_string(tags)?));
    }

    if let Some(captions) = &response.captions {
        result.insert(CAPTIONS_KEY, AnalysisValue::Json(serde_json::to_string(captions)?));
    }

    Ok(result)
}

/// Pull `personalized_scores.scores[model_id]` out of a response.
pub fn extract_personalized_score(
    response: &ImageResponse,
    model_id: &str,
) -> Result<f64, VisionError> {
    response
        .personalized_scores
        .as_ref()
        .and_then(|scores| scores.get("scores"))
        .and_then(|scores| scores.get(model_id))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            VisionError::ResponseFormat(format!(
                "missing 'personalized_scores.scores.{model_id}'"
            ))
        })
}

impl VisionClient {
    /// Analyze an image and flatten the requested fields.
    ///
    /// With `CUSTOM_ENDPOINTS` in `tasks`, every registered personalized model
    /// is queried for the same image afterwards and merged in. Custom names
    /// never overwrite `aesthetic`, `tags` or `captions`.
    pub async fn score_image(
        &self,
        image: &ImageSource,
        tasks: &[AnalysisTask],
    ) -> Result<AnalysisResult, VisionError> {
        // Fail before any request, whatever the task set
        if !self.is_connected() {
            return Err(VisionError::NotConnected);
        }

        let request = build_analyze_request(image, tasks);
        debug!(
            "Scoring image with {} remote task(s)",
            request.requests[0].tasks.len()
        );

        let response = self.fetch_analysis(&request).await?;
        let mut result = extract_analysis(&response)?;

        // Personalized scores can't share the request above
        if tasks.contains(&AnalysisTask::CustomEndpoints) {
            let scores = self.fetch_custom_scores(image).await?;
            for name in result.merge_scores(scores) {
                warn!(
                    "Custom endpoint '{}' clashes with a built-in result key, skipping",
                    name
                );
            }
        }

        info!("Image analysis returned {} field(s)", result.len());
        Ok(result)
    }

    pub async fn score_image_url(
        &self,
        image_url: &str,
        tasks: &[AnalysisTask],
    ) -> Result<AnalysisResult, VisionError> {
        self.score_image(&ImageSource::Url(image_url.to_string()), tasks)
            .await
    }

    /// Upload a local image file as base64 content.
    pub async fn score_image_file<P: AsRef<Path>>(
        &self,
        path: P,
        tasks: &[AnalysisTask],
    ) -> Result<AnalysisResult, VisionError> {
        let image = encode_image_file(path).await?;
        self.score_image(&image, tasks).await
    }

    /// Personalized score per registered model for an image URL.
    pub async fn fetch_custom_endpoints(
        &self,
        image_url: &str,
    ) -> Result<BTreeMap<String, f64>, VisionError> {
        self.fetch_custom_scores(&ImageSource::Url(image_url.to_string()))
            .await
    }

    /// One request per registered model, issued sequentially.
    pub async fn fetch_custom_scores(
        &self,
        image: &ImageSource,
    ) -> Result<BTreeMap<String, f64>, VisionError> {
        let mut scores = BTreeMap::new();

        for (model_name, model_id) in self.custom_endpoints().iter() {
            let request = AnalyzeRequest::single(
                image.clone(),
                vec![TaskSpec::PersonalizedScore {
                    model_id: model_id.to_string(),
                }],
            );

            let response = self.fetch_analysis(&request).await?;
            let score = extract_personalized_score(&response, model_id)?;
            debug!("Custom endpoint {} scored {}", model_name, score);

            scores.insert(model_name.to_string(), score);
        }

        Ok(scores)
    }
}
