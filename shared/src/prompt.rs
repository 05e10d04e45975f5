//! Builds the user prompt sent to the model.

use crate::dto::VideoInfo;

/// What the YouTube lookup produced for an analyze request.
#[derive(Debug, Clone, Copy)]
pub enum VideoContext<'a> {
    /// The client sent no video link.
    NotRequested,
    Found(&'a VideoInfo),
    /// A link was sent but no metadata could be obtained.
    Unavailable,
}

pub const UNAVAILABLE_NOTE: &str = "[참고: 제공된 YouTube 링크에서 동영상 정보를 가져오지 못했습니다. 학생이 입력한 정보와 자신의 학습된 지식만으로 분석하세요.]";

pub fn build_user_prompt(user_prompt: &str, video: VideoContext<'_>) -> String {
    match video {
        VideoContext::NotRequested => user_prompt.to_string(),
        VideoContext::Unavailable => format!("{user_prompt}\n\n{UNAVAILABLE_NOTE}"),
        VideoContext::Found(info) => with_video_info(user_prompt, info),
    }
}

fn with_video_info(user_prompt: &str, info: &VideoInfo) -> String {
    let tags = if info.tags.is_empty() {
        "없음".to_string()
    } else {
        info.tags.join(", ")
    };
    format!(
        r#"
--- [YouTube Data API로 가져온 동영상 정보 (참고용)] ---
⚠️ **중요**: 아래 YouTube 정보는 **참고 자료**일 뿐입니다. 이 정보를 그대로 믿지 말고, 반드시 자신의 학습된 지식과 검색 능력을 활용하여 **정확한 악곡 정보를 확정**하세요.

동영상 제목: {title}
채널명 (보통 연주자/가수): {channel}
게시일: {published}
태그: {tags}
설명:
{description}

**필수 작업**:
1. 위 YouTube 정보에서 악곡 제목, 작곡가, 연주자 정보를 **단서**로 추출하세요:
   - 동영상 제목에서 악곡 제목과 작곡가를 추출 (예: "베토벤 - 월광 소나타" → 작곡가: 베토벤, 제목: 월광 소나타)
   - 채널명은 보통 **연주자/가수** 정보입니다 (예: "ALLDAY PROJECT" → 연주자: ALLDAY PROJECT)
2. **이 단서를 바탕으로 자신의 학습된 지식과 검색 능력을 활용**하여 해당 악곡의 **정확한 정보**를 확정하세요.
3. YouTube 정보가 잘못되었거나 불일치하는 경우, **학습된 지식과 검색 결과를 우선**하세요.
4. 확정한 정확한 정보를 학생이 입력한 정보와 비교할 때:
   - **악곡 제목과 작곡가**를 비교하세요 (가장 중요)
   - **연주자/가수**는 참고만 하세요 (다른 연주 버전일 수 있으므로)
   - 채널명(연주자)과 학생이 입력한 **작곡가**를 비교하지 마세요
5. 확정한 정확한 정보를 기준으로 학생의 감상문을 평가하세요.

--- [원본 사용자 입력] ---
{user_prompt}
"#,
        title = info.title,
        channel = info.channel_title,
        published = info.published_at,
        description = info.description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(tags: &[&str]) -> VideoInfo {
        VideoInfo {
            title: "Beethoven - Moonlight Sonata".into(),
            description: "1st movement".into(),
            channel_title: "Classical Hub".into(),
            published_at: "2020-01-01T00:00:00Z".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn untouched_without_video() {
        assert_eq!(build_user_prompt("감상문", VideoContext::NotRequested), "감상문");
    }

    #[test]
    fn failure_note_is_appended_after_original() {
        let prompt = build_user_prompt("감상문", VideoContext::Unavailable);
        assert!(prompt.starts_with("감상문"));
        assert!(prompt.ends_with(UNAVAILABLE_NOTE));
    }

    #[test]
    fn metadata_wraps_original_input() {
        let found = info(&[]);
        let prompt = build_user_prompt("학생 감상문", VideoContext::Found(&found));
        assert!(prompt.contains("동영상 제목: Beethoven - Moonlight Sonata"));
        assert!(prompt.contains("태그: 없음"));
        assert!(prompt.trim_end().ends_with("학생 감상문"));

        let tagged = info(&["piano", "beethoven"]);
        let prompt = build_user_prompt("x", VideoContext::Found(&tagged));
        assert!(prompt.contains("태그: piano, beethoven"));
    }
}
