//! The two model stages: job-description enhancement, then resume scoring.
//!
//! Each stage is a single round trip. Neither is retried; a failed call surfaces as a
//! `PipelineError` carrying the stage name.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::llm_client::prompts::json_only_system;
use crate::llm_client::{strip_json_fences, ImageInput, LlmClient, LlmError};
use crate::models::analysis::{AnalysisOutcome, ResumeAnalysis};
use crate::pipeline::prompts::{
    ANALYSIS_PROMPT_TEMPLATE, ANALYSIS_SYSTEM, ENHANCE_PROMPT_TEMPLATE, ENHANCE_SYSTEM,
    RESUME_TEXT_SECTION_TEMPLATE,
};

/// Recorded when the scoring reply is not a JSON object and the raw text is kept instead.
pub const PARSE_FALLBACK_ERROR: &str = "Could not parse structured response, returning raw text";

/// The model capabilities the pipeline needs. `LlmClient` is the production implementation.
#[async_trait]
pub trait ReviewModel: Send + Sync {
    async fn complete_text(&self, prompt: &str, system: &str) -> Result<String, LlmError>;

    async fn complete_vision(
        &self,
        prompt: &str,
        images: &[ImageInput],
        system: &str,
    ) -> Result<String, LlmError>;
}

#[async_trait]
impl ReviewModel for LlmClient {
    async fn complete_text(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        self.complete(prompt, system).await
    }

    async fn complete_vision(
        &self,
        prompt: &str,
        images: &[ImageInput],
        system: &str,
    ) -> Result<String, LlmError> {
        self.complete_with_images(prompt, images, system).await
    }
}

/// Stage 1: returns the model's restructured job description verbatim.
pub async fn enhance_job_description(
    model: &dyn ReviewModel,
    job_description: &str,
) -> Result<String, PipelineError> {
    let prompt = ENHANCE_PROMPT_TEMPLATE.replace("{job_description}", job_description);
    let enhanced = model
        .complete_text(&prompt, ENHANCE_SYSTEM)
        .await
        .map_err(PipelineError::Enhance)?;
    info!("Job description enhanced ({} chars)", enhanced.len());
    Ok(enhanced)
}

/// Stage 2: scores the resume pages against the enhanced job description.
///
/// A reply that does not parse degrades to a raw-text summary; only a failed call is an error.
pub async fn analyze_resume_match(
    model: &dyn ReviewModel,
    enhanced_job_description: &str,
    resume_text: Option<&str>,
    pages: &[ImageInput],
) -> Result<AnalysisOutcome, PipelineError> {
    let prompt = build_analysis_prompt(enhanced_job_description, resume_text);
    let system = json_only_system(ANALYSIS_SYSTEM);

    let reply = model
        .complete_vision(&prompt, pages, &system)
        .await
        .map_err(PipelineError::Analyze)?;

    let outcome = parse_analysis(&reply);
    match &outcome.error {
        Some(_) => warn!("Scoring reply was not valid JSON; keeping raw text"),
        None => info!(
            "Resume scored: match_score={:?}, {} improvements, {} weaknesses",
            outcome.analysis.match_score,
            outcome.analysis.improvements.len(),
            outcome.analysis.weaknesses.len()
        ),
    }
    Ok(outcome)
}

fn build_analysis_prompt(enhanced_job_description: &str, resume_text: Option<&str>) -> String {
    let resume_section = resume_text
        .map(|text| RESUME_TEXT_SECTION_TEMPLATE.replace("{text}", text))
        .unwrap_or_default();
    ANALYSIS_PROMPT_TEMPLATE
        .replace("{enhanced_job_description}", enhanced_job_description)
        .replace("{resume_text}", &resume_section)
}

/// Reads the scoring reply. Anything other than a JSON object keeps the raw reply as the summary.
pub fn parse_analysis(reply: &str) -> AnalysisOutcome {
    match serde_json::from_str::<Value>(strip_json_fences(reply)) {
        Ok(Value::Object(fields)) => {
            let analysis = ResumeAnalysis {
                match_score: fields.get("match_score").and_then(score_from_value),
                improvements: string_list(fields.get("improvements")),
                weaknesses: string_list(fields.get("weaknesses")),
                summary: fields
                    .get("summary")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            };
            AnalysisOutcome {
                result: analysis.summary.clone(),
                analysis,
                error: None,
            }
        }
        _ => AnalysisOutcome {
            analysis: ResumeAnalysis {
                match_score: None,
                improvements: Vec::new(),
                weaknesses: Vec::new(),
                summary: reply.to_string(),
            },
            result: reply.to_string(),
            error: Some(PARSE_FALLBACK_ERROR.to_string()),
        },
    }
}

fn score_from_value(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[test]
    fn test_parse_analysis_reads_full_object() {
        let outcome = parse_analysis(
            r#"{
                "match_score": 78,
                "improvements": ["Quantify the migration project"],
                "weaknesses": ["No Kubernetes experience"],
                "summary": "Strong backend candidate."
            }"#,
        );
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.analysis.match_score, Some(78));
        assert_eq!(outcome.analysis.improvements, vec!["Quantify the migration project"]);
        assert_eq!(outcome.analysis.weaknesses, vec!["No Kubernetes experience"]);
        assert_eq!(outcome.result, "Strong backend candidate.");
    }

    #[test]
    fn test_parse_analysis_strips_code_fences() {
        let outcome = parse_analysis("```json\n{\"match_score\": 40, \"summary\": \"Weak fit\"}\n```");
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.analysis.match_score, Some(40));
        assert!(outcome.analysis.improvements.is_empty());
    }

    #[test]
    fn test_parse_analysis_defaults_missing_fields() {
        let outcome = parse_analysis("{}");
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.analysis, ResumeAnalysis::default());
        assert_eq!(outcome.result, "");
    }

    #[test]
    fn test_parse_analysis_tolerates_loose_score_types() {
        assert_eq!(parse_analysis(r#"{"match_score": 71.6}"#).analysis.match_score, Some(72));
        assert_eq!(parse_analysis(r#"{"match_score": "65"}"#).analysis.match_score, Some(65));
        assert_eq!(parse_analysis(r#"{"match_score": null}"#).analysis.match_score, None);
    }

    #[test]
    fn test_parse_analysis_falls_back_to_raw_text() {
        let reply = "The candidate is a decent fit, but I cannot produce JSON.";
        let outcome = parse_analysis(reply);
        assert_eq!(outcome.error.as_deref(), Some(PARSE_FALLBACK_ERROR));
        assert_eq!(outcome.analysis.summary, reply);
        assert_eq!(outcome.analysis.match_score, None);
        assert!(outcome.analysis.improvements.is_empty());
        assert_eq!(outcome.result, reply);
    }

    #[test]
    fn test_parse_analysis_non_object_json_falls_back() {
        let outcome = parse_analysis(r#"["not", "an", "object"]"#);
        assert_eq!(outcome.error.as_deref(), Some(PARSE_FALLBACK_ERROR));
    }

    #[test]
    fn test_analysis_prompt_includes_text_layer_only_when_present() {
        let with_text = build_analysis_prompt("Senior Rust engineer", Some("Jane Doe\nRust, Go"));
        assert!(with_text.starts_with("Job Description:\nSenior Rust engineer"));
        assert!(with_text.contains("RESUME TEXT:\nJane Doe\nRust, Go"));

        let without_text = build_analysis_prompt("Senior Rust engineer", None);
        assert!(!without_text.contains("RESUME TEXT"));
        assert!(!without_text.contains("{resume_text}"));
    }

    #[tokio::test]
    async fn test_enhance_sends_job_description_in_prompt() {
        let model = ScriptedModel::new(Ok("Structured JD".to_string()), Ok("{}".to_string()));
        let enhanced = enhance_job_description(&model, "We need a Rust dev").await.unwrap();
        assert_eq!(enhanced, "Structured JD");

        let calls = model.text_prompts();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].ends_with("We need a Rust dev"));
    }

    #[tokio::test]
    async fn test_enhance_failure_names_the_stage() {
        let model = ScriptedModel::new(Err(LlmError::EmptyContent), Ok("{}".to_string()));
        let err = enhance_job_description(&model, "jd").await.unwrap_err();
        assert!(err.to_string().starts_with("Error enhancing job description"));
    }

    #[tokio::test]
    async fn test_analyze_sends_every_page() {
        let model = ScriptedModel::new(
            Ok(String::new()),
            Ok(r#"{"match_score": 90, "summary": "Great"}"#.to_string()),
        );
        let pages = vec![
            ImageInput {
                media_type: "image/png".to_string(),
                data: "AAAA".to_string(),
            },
            ImageInput {
                media_type: "image/png".to_string(),
                data: "BBBB".to_string(),
            },
        ];

        let outcome = analyze_resume_match(&model, "Enhanced JD", None, &pages)
            .await
            .unwrap();

        assert_eq!(outcome.analysis.match_score, Some(90));
        assert_eq!(model.vision_image_counts(), vec![2]);
    }

    #[tokio::test]
    async fn test_analyze_call_failure_is_an_error() {
        let model = ScriptedModel::new(
            Ok(String::new()),
            Err(LlmError::Api {
                status: 400,
                message: "image too large".to_string(),
            }),
        );
        let err = analyze_resume_match(&model, "JD", None, &[]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error analyzing resume: API error (status 400): image too large"
        );
    }
}
