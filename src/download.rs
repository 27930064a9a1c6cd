use std::time::Duration;
use url::Url;

use crate::{ error::MreadError, metadata::{ Manga, PageQuality } };

pub(crate) const COVER_URL: &str = "https://uploads.mangadex.org/covers";
pub(crate) const PLACEHOLDER_COVER: &str = "https://via.placeholder.com/150x200?text=No+Image";

const USER_AGENT: &str = concat!("mread/", env!("CARGO_PKG_VERSION"));

/// The fetch functions take any configured client, so a different timeout
/// is layered here without touching them.
pub(crate) fn get_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(USER_AGENT).timeout(timeout).build()
}

pub(crate) async fn get_response_client(
    client: &reqwest::Client,
    url: &str,
    params: &[(String, String)]
) -> Result<reqwest::Response, MreadError> {
    let url = match Url::parse(url) {
        Ok(url) => url,
        Err(err) => {
            return Err(MreadError::ConversionError(format!("invalid url {} ({})", url, err)));
        }
    };
    match client.get(url).query(params).send().await {
        Ok(response) => Ok(response),
        Err(err) => Err(MreadError::NetworkError(err)),
    }
}

pub(crate) fn get_cover_url(manga_id: &str, file_name: &str) -> String {
    format!("{}/{}/{}", COVER_URL, manga_id, file_name)
}

/// Cover URL of a manga, or the fixed placeholder when no cover_art
/// relationship was delivered.
pub(crate) fn get_cover_url_or_placeholder(manga: &Manga) -> String {
    match manga.cover_file() {
        Some(file_name) => get_cover_url(&manga.id, file_name),
        None => String::from(PLACEHOLDER_COVER),
    }
}

pub(crate) fn get_page_url(
    base_url: &str,
    quality: PageQuality,
    hash: &str,
    file_name: &str
) -> String {
    format!("{}/{}/{}/{}", base_url, quality.url_segment(), hash, file_name)
}

// cover urls point at the uploads host and keep the file name
#[test]
fn test_get_cover_url_builds_uploads_url() {
    let url = get_cover_url("manga-1", "cover.png");

    assert_eq!(url, "https://uploads.mangadex.org/covers/manga-1/cover.png");
}

// page urls switch path segment with the requested quality
#[test]
fn test_get_page_url_respects_quality() {
    let full = get_page_url("https://node.example", PageQuality::Data, "abc", "1.png");
    let saver = get_page_url("https://node.example", PageQuality::DataSaver, "abc", "1.png");

    assert_eq!(full, "https://node.example/data/abc/1.png");
    assert_eq!(saver, "https://node.example/data-saver/abc/1.png");
}
