use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle strings written to `resume_analyses.status`.
/// The column is free text; nothing enforces transitions between these.
pub mod status {
    pub const SAVING: &str = "saving";
    pub const QUEUED: &str = "queued";
    pub const PROCESSING: &str = "processing";
    pub const CONVERSION_COMPLETE: &str = "conversion complete";
    pub const ENHANCING_JOB_DESCRIPTION: &str = "enhancing job description";
    pub const ANALYZING_RESUME_MATCH: &str = "analyzing resume match";
    pub const COMPLETED: &str = "completed";
    pub const ERROR: &str = "error";
}

/// Structured critique produced by the scoring stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeAnalysis {
    #[serde(default)]
    pub match_score: Option<i64>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// What the scoring stage hands back for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub analysis: ResumeAnalysis,
    /// Narrative text stored in the record's `result` field.
    pub result: String,
    /// Set when the reply could not be parsed and the raw text was kept instead.
    pub error: Option<String>,
}

/// One row of `resume_analyses`: a single uploaded resume and everything the pipeline has
/// written about it so far.
#[derive(Debug, Clone, FromRow)]
pub struct AnalysisRow {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub job_description: String,
    pub enhanced_job_description: Option<String>,
    pub result: Option<String>,
    pub analysis: Option<Json<ResumeAnalysis>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire shape returned by `GET /{id}`. Field names match what polling clients already read,
/// including the `_id` key; the two timestamps are RFC 3339.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub job_description: String,
    pub enhanced_job_description: Option<String>,
    pub result: Option<String>,
    pub analysis: Option<ResumeAnalysis>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AnalysisRow> for AnalysisSnapshot {
    fn from(row: AnalysisRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            status: row.status,
            job_description: row.job_description,
            enhanced_job_description: row.enhanced_job_description,
            result: row.result,
            analysis: row.analysis.map(|Json(a)| a),
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
impl AnalysisSnapshot {
    /// True once the worker has stopped touching the record.
    pub fn is_terminal(&self) -> bool {
        self.status == status::COMPLETED || self.status == status::ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_defaults_missing_fields() {
        let analysis: ResumeAnalysis = serde_json::from_str(r#"{"match_score": 72}"#).unwrap();
        assert_eq!(analysis.match_score, Some(72));
        assert!(analysis.improvements.is_empty());
        assert!(analysis.weaknesses.is_empty());
        assert_eq!(analysis.summary, "");
    }

    #[test]
    fn test_snapshot_serializes_id_as_underscore_id() {
        let snapshot = AnalysisSnapshot {
            id: Uuid::nil(),
            name: "cv.pdf".to_string(),
            status: status::QUEUED.to_string(),
            job_description: "Rust engineer".to_string(),
            enhanced_job_description: None,
            result: None,
            analysis: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["_id"], Uuid::nil().to_string());
        assert!(value.get("id").is_none());
        assert!(value["analysis"].is_null());
        assert!(value["created_at"].is_string());
        assert!(!snapshot.is_terminal());
    }

    #[test]
    fn test_snapshot_from_row_keeps_timestamps_and_analysis() {
        let created = Utc::now() - chrono::Duration::minutes(3);
        let updated = Utc::now();
        let row = AnalysisRow {
            id: Uuid::new_v4(),
            name: "cv.pdf".to_string(),
            status: status::COMPLETED.to_string(),
            job_description: "Rust engineer".to_string(),
            enhanced_job_description: Some("Enhanced".to_string()),
            result: Some("Good fit".to_string()),
            analysis: Some(Json(ResumeAnalysis {
                match_score: Some(80),
                ..ResumeAnalysis::default()
            })),
            error: None,
            created_at: created,
            updated_at: updated,
        };

        let snapshot = AnalysisSnapshot::from(row);
        assert_eq!(snapshot.created_at, created);
        assert_eq!(snapshot.updated_at, updated);
        assert_eq!(snapshot.analysis.unwrap().match_score, Some(80));
    }
}
