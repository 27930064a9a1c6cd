use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use uuid::Uuid;

use crate::{ error::MreadError, metadata::Chapter };

lazy_static! {
    static ref TITLE_URL_RE: Regex = Regex::new(r"/title/([\w-]+)").unwrap();
}

pub(crate) fn get_json(response: &str) -> Result<Value, MreadError> {
    match serde_json::from_str(response) {
        Ok(value) => Ok(value),
        Err(err) => Err(MreadError::JsonError(err.to_string())),
    }
}

fn chapter_number(raw: &str) -> f32 {
    match raw.trim().parse::<f32>() {
        Ok(value) => value,
        // empty or non-numeric chapter strings sort last
        Err(_) => f32::MAX,
    }
}

/// Orders a feed by numeric chapter number, publish time breaking ties.
pub(crate) fn sort_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by(|a, b| {
        match chapter_number(&a.chapter).partial_cmp(&chapter_number(&b.chapter)) {
            Some(Ordering::Equal) | None => a.publish_at.cmp(&b.publish_at),
            Some(ordering) => ordering,
        }
    });
}

/// Accepts a bare UUID or a Mangadex title URL and returns the manga id.
pub(crate) fn extract_manga_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if Uuid::parse_str(trimmed).is_ok() {
        return Some(trimmed.to_owned());
    }
    TITLE_URL_RE.captures(trimmed)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_owned())
        .filter(|id| Uuid::parse_str(id).is_ok())
}

#[cfg(test)]
fn chapter_for_test(number: &str, publish_at: Option<&str>) -> Chapter {
    Chapter {
        id: format!("ch-{}-{}", number, publish_at.unwrap_or("none")),
        manga_id: String::from("manga-1"),
        chapter: String::from(number),
        title: None,
        pages: 10,
        publish_at: publish_at.map(|raw| {
            chrono::DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&chrono::Utc)
        }),
        translated_language: String::from("en"),
    }
}

// invalid json surfaces as a json error
#[test]
fn test_get_json_rejects_invalid_input() {
    assert!(get_json("{\"data\": [").is_err());
    assert!(get_json("{\"data\": []}").is_ok());
}

// chapters order numerically, not lexicographically
#[test]
fn test_sort_chapters_orders_numerically() {
    let mut chapters = vec![
        chapter_for_test("10", None),
        chapter_for_test("2", None),
        chapter_for_test("1.5", None)
    ];

    sort_chapters(&mut chapters);

    let order: Vec<&str> = chapters
        .iter()
        .map(|chapter| chapter.chapter.as_str())
        .collect();
    assert_eq!(order, vec!["1.5", "2", "10"]);
}

// equal chapter numbers fall back to publish time
#[test]
fn test_sort_chapters_breaks_ties_by_publish_time() {
    let mut chapters = vec![
        chapter_for_test("3", Some("2024-05-02T10:00:00+00:00")),
        chapter_for_test("3", Some("2024-05-01T10:00:00+00:00"))
    ];

    sort_chapters(&mut chapters);

    assert_eq!(chapters[0].publish_at.unwrap().to_rfc3339(), "2024-05-01T10:00:00+00:00");
}

// non-numeric chapter strings sort after numbered chapters
#[test]
fn test_sort_chapters_puts_unnumbered_last() {
    let mut chapters = vec![chapter_for_test("", None), chapter_for_test("4", None)];

    sort_chapters(&mut chapters);

    assert_eq!(chapters[0].chapter, "4");
    assert_eq!(chapters[1].chapter, "");
}

// both bare uuids and title urls resolve to the manga id
#[test]
fn test_extract_manga_id_accepts_uuid_and_url() {
    let id = "6b1eb93e-473a-4ab3-9922-1a66d2a29a4a";

    assert_eq!(extract_manga_id(id), Some(id.to_string()));
    assert_eq!(
        extract_manga_id(&format!("https://mangadex.org/title/{}/some-title", id)),
        Some(id.to_string())
    );
}

// free text search input is not mistaken for an id
#[test]
fn test_extract_manga_id_rejects_plain_text() {
    assert_eq!(extract_manga_id("one piece"), None);
    assert_eq!(extract_manga_id("https://mangadex.org/title/not-a-uuid/x"), None);
}
