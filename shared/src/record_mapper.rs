//! Maps spreadsheet ranges (header row + data rows) onto [`StudentRecord`]s.
//!
//! Form response sheets are edited by teachers, so headers drift: "학번",
//! "Student ID", "학번 (5자리)" all have to land in `studentId`. Columns are
//! therefore found by case-insensitive substring match against a fixed list
//! of candidates per field.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dto::{synthesize_user_id, Scores, StudentRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Timestamp,
    StudentId,
    StudentName,
    Url,
    Title,
    Composer,
    Artist,
    MusicGenre,
    EnsembleType1,
    SenseKeywords,
    SenseColors,
    SenseText,
}

impl Field {
    pub fn is_multi_valued(self) -> bool {
        matches!(self, Field::SenseKeywords | Field::SenseColors)
    }
}

pub struct FieldSpec {
    pub field: Field,
    pub candidates: &'static [&'static str],
}

/// Field dictionary. Order matters: candidates are tried in order and the
/// first header (left to right) containing a candidate wins.
pub const FIELD_MAPPING: &[FieldSpec] = &[
    FieldSpec {
        field: Field::Timestamp,
        candidates: &["타임스탬프", "timestamp", "제출 시각"],
    },
    FieldSpec {
        field: Field::StudentId,
        candidates: &["학번", "studentid", "student id"],
    },
    FieldSpec {
        field: Field::StudentName,
        candidates: &["이름", "studentname", "student name", "name"],
    },
    FieldSpec {
        field: Field::Url,
        candidates: &["유튜브 링크", "youtube", "url", "유튜브"],
    },
    FieldSpec {
        field: Field::Title,
        candidates: &["악곡 제목", "title", "song title"],
    },
    FieldSpec {
        field: Field::Composer,
        candidates: &["작곡가", "composer"],
    },
    FieldSpec {
        field: Field::Artist,
        candidates: &["가수", "연주자", "artist", "performer", "가수 또는 연주자 이름"],
    },
    FieldSpec {
        field: Field::MusicGenre,
        candidates: &["음악 분류", "장르", "musicgenre", "genre"],
    },
    FieldSpec {
        field: Field::EnsembleType1,
        candidates: &["연주 형태", "ensembletype", "연주 형태 1"],
    },
    FieldSpec {
        field: Field::SenseKeywords,
        candidates: &["감성 키워드", "키워드", "sensekeywords", "keywords"],
    },
    FieldSpec {
        field: Field::SenseColors,
        candidates: &["핵심 색상", "색상", "sensecolors", "colors"],
    },
    FieldSpec {
        field: Field::SenseText,
        candidates: &["느낌/분위기 서술", "감상", "sensetext", "감각적 감상"],
    },
];

/// Index of the first header containing one of `candidates`, candidates
/// tried in order.
pub fn resolve_column(header: &[String], candidates: &[&str]) -> Option<usize> {
    let lowered: Vec<String> = header.iter().map(|h| h.to_lowercase()).collect();
    candidates.iter().find_map(|candidate| {
        let needle = candidate.to_lowercase();
        lowered.iter().position(|h| h.contains(&needle))
    })
}

/// Column index per field, resolved once per mapping pass.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    columns: Vec<(Field, Option<usize>)>,
}

impl ColumnMap {
    pub fn resolve(header: &[String]) -> Self {
        let columns = FIELD_MAPPING
            .iter()
            .map(|spec| (spec.field, resolve_column(header, spec.candidates)))
            .collect();
        Self { columns }
    }

    pub fn column(&self, field: Field) -> Option<usize> {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, idx)| *idx)
    }

    fn cell<'a>(&self, row: &'a [String], field: Field) -> &'a str {
        self.column(field)
            .and_then(|idx| row.get(idx))
            .map(|s| s.trim())
            .unwrap_or("")
    }
}

/// Splits a comma separated cell, trimming pieces and dropping empty ones.
pub fn split_multi(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Maps a full range read where the first row is the header.
pub fn map_values(values: &[Vec<String>]) -> Vec<StudentRecord> {
    match values.split_first() {
        Some((header, rows)) => map_rows(header, rows),
        None => Vec::new(),
    }
}

pub fn map_rows(header: &[String], rows: &[Vec<String>]) -> Vec<StudentRecord> {
    map_rows_at(header, rows, Utc::now())
}

/// Like [`map_rows`] with an explicit "current time" used for rows without a
/// usable timestamp.
pub fn map_rows_at(
    header: &[String],
    rows: &[Vec<String>],
    now: DateTime<Utc>,
) -> Vec<StudentRecord> {
    let columns = ColumnMap::resolve(header);
    rows.iter()
        .enumerate()
        .filter_map(|(index, row)| map_row(&columns, row, index, now))
        .collect()
}

fn map_row(
    columns: &ColumnMap,
    row: &[String],
    index: usize,
    now: DateTime<Utc>,
) -> Option<StudentRecord> {
    let text = |field: Field| columns.cell(row, field).to_string();
    let list = |field: Field| split_multi(columns.cell(row, field));

    let raw_timestamp = text(Field::Timestamp);
    let title = text(Field::Title);
    let student_id = text(Field::StudentId);
    let url = text(Field::Url);

    // blank or placeholder row
    if raw_timestamp.is_empty() && title.is_empty() && student_id.is_empty() && url.is_empty() {
        return None;
    }

    let millis = parse_timestamp(&raw_timestamp)
        .unwrap_or(now)
        .timestamp_millis();
    let timestamp = if raw_timestamp.is_empty() {
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    } else {
        raw_timestamp
    };

    Some(StudentRecord {
        user_id: synthesize_user_id(millis, index),
        student_id,
        student_name: text(Field::StudentName),
        timestamp,
        title,
        composer: text(Field::Composer),
        artist: text(Field::Artist),
        url,
        music_genre: text(Field::MusicGenre),
        ensemble_type1: text(Field::EnsembleType1),
        sense_keywords: list(Field::SenseKeywords),
        sense_colors: list(Field::SenseColors),
        sense_text: text(Field::SenseText),
        scores: Scores::default(),
        extra: Default::default(),
    })
}

// "2025. 11. 24 오후 8:35:5" as written by Korean-locale Google Forms
static KOREAN_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})\.\s*(\d{1,2})\.\s*(\d{1,2})\.?\s+(오전|오후)\s+(\d{1,2}):(\d{1,2}):(\d{1,2})$",
    )
    .expect("valid timestamp regex")
});

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Parses the timestamp forms found in form response sheets. Naive values are
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    parse_korean_timestamp(raw)
}

fn parse_korean_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let caps = KOREAN_TIMESTAMP.captures(raw)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let mut hour = num(5)?;
    if hour > 12 {
        return None;
    }
    match &caps[4] {
        "오전" if hour == 12 => hour = 0,
        "오후" if hour < 12 => hour += 12,
        _ => {}
    }
    let naive = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?.and_hms_opt(hour, num(6)?, num(7)?)?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn maps_minimal_sheet() {
        let header = strings(&["Timestamp", "학번", "악곡 제목"]);
        let rows = vec![strings(&["2025-01-01", "123", "Moonlight"])];
        let records = map_rows_at(&header, &rows, fixed_now());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.student_id, "123");
        assert_eq!(r.title, "Moonlight");
        assert_eq!(r.timestamp, "2025-01-01");
        assert_eq!(r.student_name, "");
        assert_eq!(r.composer, "");
        assert_eq!(r.artist, "");
        assert_eq!(r.url, "");
        assert!(r.sense_keywords.is_empty());
        assert!(r.sense_colors.is_empty());
        assert_eq!(r.scores, Scores::default());
        let jan_first = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(r.user_id, format!("user_{}_0", jan_first.timestamp_millis()));
    }

    #[test]
    fn splits_multi_valued_cells() {
        assert_eq!(
            split_multi("파랑(평화), 빨강(긴장)"),
            vec!["파랑(평화)".to_string(), "빨강(긴장)".to_string()]
        );
        assert_eq!(split_multi(" a ,, ,b,"), vec!["a", "b"]);

        let header = strings(&["핵심 색상", "악곡 제목"]);
        let rows = vec![strings(&["파랑(평화), 빨강(긴장)", "Bolero"])];
        let records = map_rows_at(&header, &rows, fixed_now());
        assert_eq!(records[0].sense_colors, vec!["파랑(평화)", "빨강(긴장)"]);
    }

    #[test]
    fn header_only_sheet_is_empty() {
        let values = vec![strings(&["Timestamp", "학번"])];
        assert!(map_values(&values).is_empty());
        assert!(map_values(&[]).is_empty());
    }

    #[test]
    fn blank_rows_are_dropped_and_short_rows_padded() {
        let header = strings(&["Timestamp", "학번", "악곡 제목", "작곡가"]);
        let rows = vec![
            strings(&["", "", "", "Bach"]),
            strings(&["2025-01-02 10:00:00", "7"]),
            vec![],
        ];
        let records = map_rows_at(&header, &rows, fixed_now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_id, "7");
        assert_eq!(records[0].composer, "");
        assert!(records[0].user_id.ends_with("_1"));
    }

    #[test]
    fn unparseable_timestamp_falls_back_to_now() {
        let header = strings(&["타임스탬프", "악곡 제목"]);
        let rows = vec![strings(&["어제쯤", "Arirang"]), strings(&["", "Arirang"])];
        let records = map_rows_at(&header, &rows, fixed_now());
        let millis = fixed_now().timestamp_millis();
        assert_eq!(records[0].user_id, format!("user_{millis}_0"));
        assert_eq!(records[0].timestamp, "어제쯤");
        assert_eq!(records[1].user_id, format!("user_{millis}_1"));
        assert_eq!(records[1].timestamp, "2025-06-01T12:00:00.000Z");
    }

    #[test]
    fn first_matching_candidate_wins_ties() {
        // "가수" is tried before "연주자", so the singer column wins even though
        // the performer column comes first.
        let header = strings(&["연주자", "가수"]);
        assert_eq!(resolve_column(&header, FIELD_MAPPING[6].candidates), Some(1));
        // same candidate, several headers: leftmost wins
        let header = strings(&["Song Title", "Title (again)"]);
        assert_eq!(resolve_column(&header, &["title"]), Some(0));
        assert_eq!(resolve_column(&header, &["composer"]), None);
    }

    #[test]
    fn parses_known_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2025, 11, 24, 20, 35, 5).unwrap();
        assert_eq!(parse_timestamp("2025. 11. 24 오후 8:35:5"), Some(expected));
        assert_eq!(parse_timestamp("2025-11-24T20:35:05Z"), Some(expected));
        assert_eq!(parse_timestamp("11/24/2025 20:35:05"), Some(expected));
        assert_eq!(
            parse_timestamp("2025. 1. 2 오전 12:00:00"),
            Some(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("soon"), None);
    }
}
