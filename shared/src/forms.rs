//! Relays a student submission to the Google Form that feeds the sheet.

use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::AppError;
use crate::upstream::UpstreamError;

/// Submission field → form entry id.
pub const FORM_ENTRIES: &[(&str, &str)] = &[
    ("studentId", "entry.514455809"),
    ("studentName", "entry.1927164281"),
    ("url", "entry.759135577"),
    ("title", "entry.651308062"),
    ("composer", "entry.879467409"),
    ("artist", "entry.1693298501"),
    ("ensembleType1", "entry.1313965673"),
    ("musicGenre", "entry.2019841641"),
    ("senseKeywords", "entry.402441130"),
    ("senseText", "entry.56073634"),
    ("senseColors", "entry.1205363687"),
    ("techSound", "entry.1842277818"),
    ("techRhythm", "entry.1494839761"),
    ("analysisHarmony", "entry.951948701"),
    ("analysisForm", "entry.730534621"),
    ("interpIntent", "entry.1563387102"),
    ("interpScene", "entry.1108413047"),
    ("evalArt", "entry.251864974"),
    ("evalApply", "entry.2091835272"),
    ("feedbackInput", "entry.1358120920"),
    ("finalAppreciation", "entry.1985851644"),
];

/// Text a form field receives for a submitted value; `None` for empties.
pub fn field_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(field_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(_) => value.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Form-encoded pairs in entry table order. Unknown members are not sent.
pub fn encode_submission(data: &Map<String, Value>) -> Vec<(&'static str, String)> {
    FORM_ENTRIES
        .iter()
        .filter_map(|(field, entry)| {
            data.get(*field)
                .and_then(field_text)
                .map(|text| (*entry, text))
        })
        .collect()
}

pub struct FormsClient {
    client: Client,
    form_url: Option<String>,
}

impl FormsClient {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            form_url: settings.form_url().map(str::to_string),
        }
    }

    /// Posts the submission and returns Google's HTTP status. Forms answers
    /// with redirects and HTML, so any status counts as delivered.
    pub async fn submit(&self, data: &Map<String, Value>) -> Result<u16, AppError> {
        let url = self
            .form_url
            .as_deref()
            .ok_or(AppError::NotConfigured("GOOGLE_FORM_URL"))?;

        let fields = encode_submission(data);
        info!(fields = fields.len(), "submitting to Google Form");
        let res = self
            .client
            .post(url)
            .form(&fields)
            .send()
            .await
            .map_err(|e| {
                let err = UpstreamError::transport(e);
                warn!("Google Form submission failed: {err}");
                err
            })?;

        let status = res.status().as_u16();
        info!(status, "Google Form answered");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_are_flattened_to_text() {
        assert_eq!(field_text(&json!(["a", "b", ""])), Some("a, b".into()));
        assert_eq!(field_text(&json!(4.5)), Some("4.5".into()));
        assert_eq!(field_text(&json!(true)), Some("true".into()));
        assert_eq!(field_text(&json!("  ")), None);
        assert_eq!(field_text(&json!([])), None);
        assert_eq!(field_text(&Value::Null), None);
    }

    #[test]
    fn submission_maps_to_entry_ids() {
        let data = json!({
            "studentId": "10101",
            "title": "Boléro",
            "senseKeywords": ["calm", "warm"],
            "composer": "",
            "unknownField": "ignored",
        });
        let pairs = encode_submission(data.as_object().unwrap());
        assert_eq!(
            pairs,
            vec![
                ("entry.514455809", "10101".to_string()),
                ("entry.651308062", "Boléro".to_string()),
                ("entry.402441130", "calm, warm".to_string()),
            ]
        );
    }
}
