use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::dto::{
    AnalyzeRequest, AnalyzeResponse, FormsResponse, HealthResponse, StudentRecord,
    StudentsResponse, VideoInfoRequest, VideoInfoResponse,
};
use shared::error::AppError;
use shared::llm::CompletionRequest;
use shared::prompt::{build_user_prompt, VideoContext};
use shared::store::StudentFilter;
use tracing::{error, info, warn};

use crate::AppState;

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, details: Option<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            details,
        }),
    )
}

/// Configuration problems name the missing variable; upstream failures carry
/// a generic message plus the underlying error as `details`.
fn failure(context: &str, err: AppError) -> ApiError {
    match err {
        AppError::NotConfigured(var) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{var}가 설정되지 않았습니다."),
            None,
        ),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, context, Some(other.to_string())),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let s = &state.settings;
    Json(HealthResponse {
        status: "OK".into(),
        openai_api_key_set: s.openai_key().is_some(),
        youtube_api_key_set: s.youtube_key().is_some(),
        gemini_api_key_set: s.gemini_key().is_some(),
        google_form_url_set: s.form_url().is_some(),
        google_sheets_id_set: s.sheets_id().is_some(),
        llm_backend: s.llm_backend.as_str().into(),
    })
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(input): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let Some(user_prompt) = present(&input.user_prompt) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "userPrompt가 필요합니다.",
            None,
        ));
    };

    let video = match present(&input.youtube_url) {
        Some(url) => state.youtube.video_info(url).await,
        None => None,
    };
    let context = match (&video, present(&input.youtube_url)) {
        (Some(info), _) => VideoContext::Found(info),
        (None, Some(_)) => VideoContext::Unavailable,
        (None, None) => VideoContext::NotRequested,
    };

    let request = CompletionRequest {
        system_instruction: input.system_instruction.clone(),
        user_prompt: build_user_prompt(user_prompt, context),
        json_output: input.json_output,
    };
    info!(
        backend = state.llm.name(),
        json_output = request.json_output,
        with_video = video.is_some(),
        "analyze request"
    );

    let result = state.llm.complete(&request).await.map_err(|e| {
        error!("analysis failed: {e}");
        failure("AI 분석 중 오류가 발생했습니다.", e)
    })?;
    Ok(Json(AnalyzeResponse { result }))
}

pub async fn youtube_info(
    State(state): State<AppState>,
    Json(input): Json<VideoInfoRequest>,
) -> Result<Json<VideoInfoResponse>, ApiError> {
    let Some(url) = present(&input.video_url) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "videoUrl이 필요합니다.", None));
    };
    match state.youtube.video_info(url).await {
        Some(video_info) => Ok(Json(VideoInfoResponse { video_info })),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            "YouTube 동영상 정보를 가져올 수 없습니다.",
            None,
        )),
    }
}

pub async fn google_forms(
    State(state): State<AppState>,
    Json(data): Json<Map<String, Value>>,
) -> Result<Json<FormsResponse>, ApiError> {
    info!(fields = data.len(), "form submission received");
    let status = state.forms.submit(&data).await.map_err(|e| {
        error!("form relay failed: {e}");
        failure("Google Forms 전송 중 오류가 발생했습니다.", e)
    })?;

    match StudentRecord::from_submission(&data, Utc::now()) {
        Ok(record) => {
            if let Err(e) = state.store.upsert(record).await {
                warn!(store = state.store.kind(), "saving submission locally failed: {e}");
            }
        }
        Err(e) => warn!("submission is not a valid student record: {e}"),
    }

    Ok(Json(FormsResponse {
        success: true,
        message: "Google Forms로 데이터가 성공적으로 전송되었습니다.".into(),
        status,
    }))
}

#[derive(Deserialize, Debug, Default)]
pub struct StudentsQuery {
    pub title: Option<String>,
    pub composer: Option<String>,
    /// Kept as text so a malformed value is ignored instead of rejected.
    pub limit: Option<String>,
}

impl From<StudentsQuery> for StudentFilter {
    fn from(q: StudentsQuery) -> Self {
        StudentFilter {
            title: q.title,
            composer: q.composer,
            limit: q.limit.and_then(|l| l.trim().parse::<usize>().ok()),
        }
    }
}

/// Always answers 200 with `success: true`; read failures only show up in
/// `error`.
pub async fn students_data(
    State(state): State<AppState>,
    Query(query): Query<StudentsQuery>,
) -> Json<StudentsResponse> {
    let filter = StudentFilter::from(query);
    match state.store.list().await {
        Ok(records) => {
            let total = records.len();
            let students = filter.apply(records);
            info!(
                store = state.store.kind(),
                total,
                count = students.len(),
                "students data served"
            );
            Json(StudentsResponse {
                success: true,
                count: students.len(),
                total,
                students,
                error: None,
            })
        }
        Err(e) => {
            error!(store = state.store.kind(), "reading students data failed: {e}");
            // the front-end renders an empty list instead of failing
            Json(StudentsResponse {
                success: true,
                students: Vec::new(),
                count: 0,
                total: 0,
                error: Some(e.to_string()),
            })
        }
    }
}
