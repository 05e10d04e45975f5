use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default, deserialize_with = "lenient::text")]
    pub system_instruction: String,
    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub json_output: bool,
    #[serde(default)]
    pub youtube_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub result: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfoRequest {
    #[serde(default)]
    pub video_url: Option<String>,
}

/// Metadata of one YouTube video as returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub title: String,
    pub description: String,
    pub channel_title: String,
    pub published_at: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfoResponse {
    pub video_info: VideoInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    #[serde(default, deserialize_with = "lenient::number")]
    pub sense_score: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub tech_score: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub analysis_score: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub consistency_score: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub aesthetic_score: f64,
}

/// One student's appreciation entry, either mapped from a sheet row or taken
/// from a form submission.
///
/// Submitted members without a dedicated field (`techSound`,
/// `finalAppreciation`, ...) are kept in `extra` so the local store does not
/// drop them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    #[serde(default, deserialize_with = "lenient::text")]
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub student_id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub student_name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub composer: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub artist: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub music_genre: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub ensemble_type1: String,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub sense_keywords: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text_list")]
    pub sense_colors: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub sense_text: String,
    #[serde(default)]
    pub scores: Scores,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StudentRecord {
    /// Builds a record from a raw form submission, filling in `timestamp` and
    /// `userId` when the client did not send them.
    pub fn from_submission(
        data: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let mut record: StudentRecord = serde_json::from_value(Value::Object(data.clone()))?;
        if record.timestamp.trim().is_empty() {
            record.timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        }
        if record.user_id.trim().is_empty() {
            record.user_id = synthesize_user_id(now.timestamp_millis(), 0);
        }
        Ok(record)
    }

    /// Two records describe the same entry when user and video match.
    pub fn same_entry(&self, other: &StudentRecord) -> bool {
        self.user_id == other.user_id && self.url == other.url
    }
}

/// `user_{millis}_{row}`; unique within one mapping pass through `row`.
pub fn synthesize_user_id(epoch_millis: i64, row: usize) -> String {
    format!("user_{epoch_millis}_{row}")
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentsResponse {
    pub success: bool,
    pub students: Vec<StudentRecord>,
    pub count: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FormsResponse {
    pub success: bool,
    pub message: String,
    pub status: u16,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub openai_api_key_set: bool,
    pub youtube_api_key_set: bool,
    pub gemini_api_key_set: bool,
    pub google_form_url_set: bool,
    pub google_sheets_id_set: bool,
    pub llm_backend: String,
}

/// Deserializers that accept what browsers actually send: numbers where text
/// is expected, comma separated strings where lists are expected.
mod lenient {
    use super::*;

    pub fn text<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            Value::Array(items) => items
                .iter()
                .map(value_text)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        })
    }

    pub fn text_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .iter()
                .map(value_text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Value::String(s) => crate::record_mapper::split_multi(&s),
            other => vec![other.to_string()],
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Number(n) => n.as_f64().unwrap_or_default(),
            Value::String(s) => s.trim().parse().unwrap_or_default(),
            _ => 0.0,
        })
    }

    /// `null` is false; `"true"`, `"1"` and non-zero numbers are true.
    pub fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Bool(b) => b,
            Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
            Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
            _ => false,
        })
    }

    fn value_text(v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn submission_keeps_unknown_fields_and_fills_ids() {
        let data = json!({
            "studentId": 20301,
            "title": "Clair de Lune",
            "senseKeywords": "calm, dreamy",
            "senseColors": ["blue", " silver "],
            "finalAppreciation": "lovely",
            "scores": {"senseScore": "4", "techScore": 3}
        });
        let record = StudentRecord::from_submission(data.as_object().unwrap(), now()).unwrap();
        assert_eq!(record.student_id, "20301");
        assert_eq!(record.sense_keywords, vec!["calm", "dreamy"]);
        assert_eq!(record.sense_colors, vec!["blue", "silver"]);
        assert_eq!(record.scores.sense_score, 4.0);
        assert_eq!(record.scores.tech_score, 3.0);
        assert_eq!(record.extra.get("finalAppreciation"), Some(&json!("lovely")));
        assert_eq!(record.user_id, format!("user_{}_0", now().timestamp_millis()));
        assert_eq!(record.timestamp, "2025-03-01T09:00:00.000Z");
    }

    #[test]
    fn client_user_id_wins() {
        let data = json!({"userId": "u-7", "timestamp": "2025-01-01"});
        let record = StudentRecord::from_submission(data.as_object().unwrap(), now()).unwrap();
        assert_eq!(record.user_id, "u-7");
        assert_eq!(record.timestamp, "2025-01-01");
    }

    #[test]
    fn analyze_request_tolerates_nulls() {
        let req: AnalyzeRequest = serde_json::from_value(json!({
            "systemInstruction": null,
            "userPrompt": "p",
            "jsonOutput": null
        }))
        .unwrap();
        assert_eq!(req.system_instruction, "");
        assert!(!req.json_output);
        assert_eq!(req.user_prompt.as_deref(), Some("p"));

        let req: AnalyzeRequest =
            serde_json::from_value(json!({"userPrompt": "p", "jsonOutput": "true"})).unwrap();
        assert!(req.json_output);
    }

    #[test]
    fn record_serializes_camel_case_with_zero_scores() {
        let value = serde_json::to_value(StudentRecord::default()).unwrap();
        assert_eq!(value["ensembleType1"], json!(""));
        assert_eq!(value["senseKeywords"], json!([]));
        assert_eq!(value["scores"]["aestheticScore"], json!(0.0));
    }
}
