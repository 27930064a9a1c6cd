use serde_json::Value;
use std::collections::BTreeMap;

use crate::{
    download::{ self, get_response_client },
    error::{ suspend_error, MreadError },
    metadata::{
        Chapter,
        ContentRating,
        GalleryImage,
        Manga,
        PageImage,
        PageQuality,
        ResourcePage,
        SortKey,
        SortOrder,
        Tag,
    },
    utils,
};

pub(crate) const MANGADEX_API: &str = "https://api.mangadex.org";
pub(crate) const GALLERY_API: &str = "https://api.nekosapi.com/v3/images";

fn get_exe_path() -> Result<String, MreadError> {
    let current = match std::env::current_exe() {
        Ok(value) => value,
        Err(err) => {
            return Err(MreadError::IoError(err, None));
        }
    };
    let parent = match current.parent() {
        Some(value) => value,
        None => {
            return Err(MreadError::NotFoundError(String::from("Parent not found")));
        }
    };
    let path = match parent.to_str() {
        Some(value) => value.to_string(),
        None => {
            return Err(MreadError::ConversionError(String::from("Transition to str failed")));
        }
    };
    Ok(path)
}

pub(crate) fn get_db_path() -> Result<String, MreadError> {
    let path = match get_exe_path() {
        Ok(value) => value,
        Err(err) => {
            return Err(err);
        }
    };
    Ok(format!("{}/mread.db", path))
}

/// One typed catalog listing/search query; rendered to wire parameters by
/// `params`. Pornographic is dropped there no matter what the caller put in
/// `content_ratings`.
#[derive(Clone, Debug)]
pub(crate) struct MangaQuery {
    pub(crate) limit: u32,
    pub(crate) offset: u32,
    pub(crate) sort: SortKey,
    pub(crate) order: SortOrder,
    pub(crate) included_tags: Vec<String>,
    pub(crate) excluded_tags: Vec<String>,
    pub(crate) content_ratings: Vec<ContentRating>,
    pub(crate) title: Option<String>,
}

impl MangaQuery {
    pub(crate) fn new(
        limit: u32,
        sort: SortKey,
        order: SortOrder,
        content_ratings: Vec<ContentRating>
    ) -> MangaQuery {
        MangaQuery {
            limit,
            offset: 0,
            sort,
            order,
            included_tags: Vec::new(),
            excluded_tags: Vec::new(),
            content_ratings,
            title: None,
        }
    }

    pub(crate) fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            (String::from("limit"), self.limit.to_string()),
            (String::from("offset"), self.offset.to_string()),
            (format!("order[{}]", self.sort.as_param()), self.order.as_param().to_string()),
            (String::from("includes[]"), String::from("cover_art"))
        ];
        for rating in &self.content_ratings {
            if *rating == ContentRating::Pornographic {
                continue;
            }
            params.push((String::from("contentRating[]"), rating.as_param().to_string()));
        }
        for tag in &self.included_tags {
            params.push((String::from("includedTags[]"), tag.clone()));
        }
        if !self.included_tags.is_empty() {
            params.push((String::from("includedTagsMode"), String::from("AND")));
        }
        for tag in &self.excluded_tags {
            params.push((String::from("excludedTags[]"), tag.clone()));
        }
        if !self.excluded_tags.is_empty() {
            params.push((String::from("excludedTagsMode"), String::from("OR")));
        }
        if let Some(title) = &self.title {
            params.push((String::from("title"), title.clone()));
        }
        params
    }
}

/// Chapter feed query of one manga. `readable_only` drops chapters with
/// zero pages, which exist as metadata but are hosted elsewhere.
#[derive(Clone, Debug)]
pub(crate) struct FeedQuery {
    pub(crate) manga_id: String,
    pub(crate) limit: u32,
    pub(crate) offset: u32,
    pub(crate) languages: Vec<String>,
    pub(crate) readable_only: bool,
}

impl FeedQuery {
    pub(crate) fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            (String::from("limit"), self.limit.to_string()),
            (String::from("offset"), self.offset.to_string()),
            (String::from("order[chapter]"), String::from("asc"))
        ];
        for language in &self.languages {
            params.push((String::from("translatedLanguage[]"), language.clone()));
        }
        params
    }
}

async fn get_json_body(
    client: &reqwest::Client,
    url: &str,
    params: &[(String, String)]
) -> Result<Value, MreadError> {
    let response = match get_response_client(client, url, params).await {
        Ok(response) => response,
        Err(err) => {
            return Err(err);
        }
    };
    if response.status().is_success() {
        let json = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                return Err(MreadError::NetworkError(err));
            }
        };
        utils::get_json(&json)
    } else {
        eprintln!(
            "Error: Failed to fetch data from the API. Status code: {:?} ({})",
            response.status(),
            url
        );
        Err(MreadError::StatusError(response.status()))
    }
}

pub(crate) fn parse_manga_page(json: &Value) -> Result<ResourcePage<Manga>, MreadError> {
    let data = match json.get("data").and_then(Value::as_array) {
        Some(data) => data,
        None => {
            return Err(MreadError::JsonError(String::from("Did not find data")));
        }
    };
    let mut items: Vec<Manga> = Vec::new();
    for value in data {
        match Manga::from_value(value) {
            Ok(manga) => {
                if !items.iter().any(|item| item.id == manga.id) {
                    items.push(manga);
                }
            }
            Err(err) => {
                suspend_error(err, "parse_manga_page");
            }
        }
    }
    Ok(ResourcePage {
        items,
        total: json.get("total").and_then(Value::as_u64),
    })
}

pub(crate) fn parse_chapter_feed(
    manga_id: &str,
    json: &Value,
    readable_only: bool
) -> Result<ResourcePage<Chapter>, MreadError> {
    let data = match json.get("data").and_then(Value::as_array) {
        Some(data) => data,
        None => {
            return Err(MreadError::JsonError(String::from("Did not find data")));
        }
    };
    let mut items: Vec<Chapter> = Vec::new();
    for value in data {
        match Chapter::from_value(manga_id, value) {
            Ok(chapter) => {
                if readable_only && !chapter.is_readable() {
                    continue;
                }
                items.push(chapter);
            }
            Err(err) => {
                suspend_error(err, "parse_chapter_feed");
            }
        }
    }
    Ok(ResourcePage {
        items,
        total: json.get("total").and_then(Value::as_u64),
    })
}

pub(crate) fn parse_chapter_pages(
    json: &Value,
    quality: PageQuality
) -> Result<Vec<PageImage>, MreadError> {
    let base_url = match json.get("baseUrl").and_then(Value::as_str) {
        Some(base_url) => base_url,
        None => {
            return Err(MreadError::JsonError(String::from("Did not find baseUrl")));
        }
    };
    let chapter = match json.get("chapter") {
        Some(chapter) => chapter,
        None => {
            return Err(MreadError::JsonError(String::from("Did not find chapter")));
        }
    };
    let hash = match chapter.get("hash").and_then(Value::as_str) {
        Some(hash) => hash,
        None => {
            return Err(MreadError::JsonError(String::from("Did not find chapter hash")));
        }
    };
    let files = match chapter.get(quality.json_key()).and_then(Value::as_array) {
        Some(files) => files,
        None => {
            return Err(
                MreadError::JsonError(format!("Did not find chapter {}", quality.json_key()))
            );
        }
    };
    let mut pages = Vec::new();
    for (index, file) in files.iter().enumerate() {
        let file_name = match file.as_str() {
            Some(file_name) => file_name,
            None => {
                return Err(MreadError::JsonError(format!("Page {} is not a file name", index)));
            }
        };
        pages.push(PageImage::new(index, download::get_page_url(base_url, quality, hash, file_name)));
    }
    Ok(pages)
}

pub(crate) fn parse_tags(json: &Value) -> Result<BTreeMap<String, Vec<Tag>>, MreadError> {
    let data = match json.get("data").and_then(Value::as_array) {
        Some(data) => data,
        None => {
            return Err(MreadError::JsonError(String::from("Did not find data")));
        }
    };
    let mut groups: BTreeMap<String, Vec<Tag>> = BTreeMap::new();
    for value in data {
        let id = get_attr_as_str(value, "id");
        if id.is_empty() {
            continue;
        }
        let attributes = match value.get("attributes") {
            Some(attributes) => attributes,
            None => {
                continue;
            }
        };
        let name = attributes
            .get("name")
            .and_then(|name| name.get("en"))
            .and_then(Value::as_str)
            .unwrap_or(id);
        let group = match attributes.get("group").and_then(Value::as_str) {
            Some(group) if !group.is_empty() => group,
            _ => "Other",
        };
        groups.entry(group.to_owned()).or_default().push(Tag::new(id, name, group));
    }
    Ok(groups)
}

pub(crate) fn parse_gallery_page(json: &Value) -> Result<ResourcePage<GalleryImage>, MreadError> {
    let items = match json.get("items").and_then(Value::as_array) {
        Some(items) => items,
        None => {
            return Err(MreadError::JsonError(String::from("Did not find items")));
        }
    };
    let mut images: Vec<GalleryImage> = Vec::new();
    for item in items {
        match serde_json::from_value::<GalleryImage>(item.clone()) {
            Ok(image) => images.push(image),
            Err(err) => {
                suspend_error(MreadError::JsonError(err.to_string()), "parse_gallery_page");
            }
        }
    }
    Ok(ResourcePage {
        items: images,
        total: json.get("count").and_then(Value::as_u64),
    })
}

pub(crate) async fn get_manga_list(
    client: &reqwest::Client,
    query: &MangaQuery
) -> Result<ResourcePage<Manga>, MreadError> {
    let json = match
        get_json_body(client, &format!("{}/manga", MANGADEX_API), &query.params()).await
    {
        Ok(json) => json,
        Err(err) => {
            return Err(err);
        }
    };
    parse_manga_page(&json)
}

pub(crate) async fn get_manga(client: &reqwest::Client, id: &str) -> Result<Manga, MreadError> {
    let params = vec![(String::from("includes[]"), String::from("cover_art"))];
    let json = match
        get_json_body(client, &format!("{}/manga/{}", MANGADEX_API, id), &params).await
    {
        Ok(json) => json,
        Err(err) => {
            return Err(err);
        }
    };
    let data = match json.get("data") {
        Some(data) => data,
        None => {
            return Err(MreadError::JsonError(String::from("Did not find data")));
        }
    };
    Manga::from_value(data)
}

pub(crate) async fn get_manga_feed(
    client: &reqwest::Client,
    query: &FeedQuery
) -> Result<ResourcePage<Chapter>, MreadError> {
    let url = format!("{}/manga/{}/feed", MANGADEX_API, query.manga_id);
    let json = match get_json_body(client, &url, &query.params()).await {
        Ok(json) => json,
        Err(err) => {
            return Err(err);
        }
    };
    parse_chapter_feed(&query.manga_id, &json, query.readable_only)
}

pub(crate) async fn get_chapter_pages(
    client: &reqwest::Client,
    chapter_id: &str,
    quality: PageQuality
) -> Result<Vec<PageImage>, MreadError> {
    let url = format!("{}/at-home/server/{}", MANGADEX_API, chapter_id);
    let json = match get_json_body(client, &url, &[]).await {
        Ok(json) => json,
        Err(err) => {
            return Err(err);
        }
    };
    parse_chapter_pages(&json, quality)
}

pub(crate) async fn get_tags(
    client: &reqwest::Client
) -> Result<BTreeMap<String, Vec<Tag>>, MreadError> {
    let json = match get_json_body(client, &format!("{}/manga/tag", MANGADEX_API), &[]).await {
        Ok(json) => json,
        Err(err) => {
            return Err(err);
        }
    };
    parse_tags(&json)
}

pub(crate) async fn get_gallery_page(
    client: &reqwest::Client,
    offset: u32,
    limit: u32
) -> Result<ResourcePage<GalleryImage>, MreadError> {
    let params = vec![
        (String::from("limit"), limit.to_string()),
        (String::from("offset"), offset.to_string())
    ];
    let json = match get_json_body(client, GALLERY_API, &params).await {
        Ok(json) => json,
        Err(err) => {
            return Err(err);
        }
    };
    parse_gallery_page(&json)
}

pub(crate) fn get_attr_as_str<'a>(obj: &'a Value, attr: &'a str) -> &'a str {
    match obj.get(attr).and_then(Value::as_str) {
        Some(value) => value,
        None => "",
    }
}

pub(crate) fn get_attr_as_u64(obj: &Value, attr: &str) -> u64 {
    match obj.get(attr).and_then(Value::as_u64) {
        Some(value) => value,
        None => 0,
    }
}

// default ratings never emit erotica or pornographic
#[test]
fn test_params_without_adult_content_omit_erotica() {
    let query = MangaQuery::new(
        32,
        SortKey::Rating,
        SortOrder::Desc,
        vec![ContentRating::Safe, ContentRating::Suggestive]
    );

    let params = query.params();

    assert!(params.contains(&(String::from("contentRating[]"), String::from("safe"))));
    assert!(params.contains(&(String::from("contentRating[]"), String::from("suggestive"))));
    assert!(!params.iter().any(|(_, value)| value == "erotica"));
    assert!(!params.iter().any(|(_, value)| value == "pornographic"));
}

// pornographic is dropped even when a caller sneaks it into the allow-set
#[test]
fn test_params_never_emit_pornographic() {
    let query = MangaQuery::new(
        32,
        SortKey::Rating,
        SortOrder::Desc,
        vec![ContentRating::Erotica, ContentRating::Pornographic]
    );

    let params = query.params();

    assert!(params.contains(&(String::from("contentRating[]"), String::from("erotica"))));
    assert!(!params.iter().any(|(_, value)| value == "pornographic"));
}

// included tags are AND-combined, excluded tags OR-combined
#[test]
fn test_params_set_tag_modes() {
    let mut query = MangaQuery::new(32, SortKey::CreatedAt, SortOrder::Desc, vec![
        ContentRating::Safe,
    ]);
    query.included_tags = vec![String::from("tag-a"), String::from("tag-b")];
    query.excluded_tags = vec![String::from("tag-c")];

    let params = query.params();

    assert!(params.contains(&(String::from("includedTags[]"), String::from("tag-a"))));
    assert!(params.contains(&(String::from("includedTags[]"), String::from("tag-b"))));
    assert!(params.contains(&(String::from("includedTagsMode"), String::from("AND"))));
    assert!(params.contains(&(String::from("excludedTags[]"), String::from("tag-c"))));
    assert!(params.contains(&(String::from("excludedTagsMode"), String::from("OR"))));
}

// tag modes stay off the wire while no tags are selected
#[test]
fn test_params_omit_tag_modes_without_tags() {
    let query = MangaQuery::new(32, SortKey::CreatedAt, SortOrder::Desc, vec![
        ContentRating::Safe,
    ]);

    let params = query.params();

    assert!(!params.iter().any(|(key, _)| key == "includedTagsMode"));
    assert!(!params.iter().any(|(key, _)| key == "excludedTagsMode"));
}

// sort key and order render as one order[<field>] parameter
#[test]
fn test_params_render_sort_order() {
    let query = MangaQuery::new(10, SortKey::LatestUploadedChapter, SortOrder::Desc, vec![
        ContentRating::Safe,
    ]);

    let params = query.params();

    assert!(
        params.contains(&(String::from("order[latestUploadedChapter]"), String::from("desc")))
    );
}

// feed params carry every selected translation language
#[test]
fn test_feed_params_carry_languages() {
    let query = FeedQuery {
        manga_id: String::from("manga-1"),
        limit: 100,
        offset: 0,
        languages: vec![String::from("en"), String::from("pl")],
        readable_only: true,
    };

    let params = query.params();

    assert!(params.contains(&(String::from("translatedLanguage[]"), String::from("en"))));
    assert!(params.contains(&(String::from("translatedLanguage[]"), String::from("pl"))));
    assert!(params.contains(&(String::from("order[chapter]"), String::from("asc"))));
}

// a listing page parses into deduplicated manga with a total
#[test]
fn test_parse_manga_page_deduplicates_by_id() {
    let json =
        serde_json::json!({
        "data": [
            {
                "id": "manga-1",
                "attributes": { "title": { "en": "First" } },
                "relationships": []
            },
            {
                "id": "manga-1",
                "attributes": { "title": { "en": "First again" } },
                "relationships": []
            },
            {
                "id": "manga-2",
                "attributes": { "title": { "en": "Second" } },
                "relationships": []
            }
        ],
        "total": 1402
    });

    let page = parse_manga_page(&json).unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].id, "manga-1");
    assert_eq!(page.items[1].id, "manga-2");
    assert_eq!(page.total, Some(1402));
}

// cover_art relationships surface through the parsed manga
#[test]
fn test_parse_manga_page_keeps_cover_relationship() {
    let json =
        serde_json::json!({
        "data": [
            {
                "id": "manga-1",
                "attributes": {
                    "title": { "en": "First" },
                    "year": 2019,
                    "status": "completed",
                    "contentRating": "suggestive"
                },
                "relationships": [
                    {
                        "id": "rel-1",
                        "type": "cover_art",
                        "attributes": { "fileName": "cover.jpg" }
                    }
                ]
            }
        ]
    });

    let page = parse_manga_page(&json).unwrap();
    let manga = &page.items[0];

    assert_eq!(manga.cover_file(), Some("cover.jpg"));
    assert_eq!(manga.year, Some(2019));
    assert_eq!(manga.status, crate::metadata::Status::Completed);
    assert_eq!(manga.content_rating, ContentRating::Suggestive);
}

// readable feeds drop zero-page chapters, full feeds keep them
#[test]
fn test_parse_chapter_feed_readable_filter() {
    let json =
        serde_json::json!({
        "data": [
            {
                "id": "ch-1",
                "attributes": { "chapter": "1", "pages": 20, "translatedLanguage": "en" }
            },
            {
                "id": "ch-2",
                "attributes": { "chapter": "2", "pages": 0, "translatedLanguage": "en" }
            }
        ]
    });

    let readable = parse_chapter_feed("manga-1", &json, true).unwrap();
    let all = parse_chapter_feed("manga-1", &json, false).unwrap();

    assert_eq!(readable.items.len(), 1);
    assert_eq!(readable.items[0].id, "ch-1");
    assert_eq!(all.items.len(), 2);
    assert_eq!(all.items[1].pages, 0);
}

// at-home responses resolve to ordered page urls
#[test]
fn test_parse_chapter_pages_builds_urls_in_order() {
    let json =
        serde_json::json!({
        "baseUrl": "https://node.example",
        "chapter": {
            "hash": "abc",
            "data": ["1.png", "2.png"],
            "dataSaver": ["1.jpg", "2.jpg"]
        }
    });

    let pages = parse_chapter_pages(&json, PageQuality::Data).unwrap();
    let saver = parse_chapter_pages(&json, PageQuality::DataSaver).unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].index, 0);
    assert_eq!(pages[0].url, "https://node.example/data/abc/1.png");
    assert_eq!(pages[1].url, "https://node.example/data/abc/2.png");
    assert_eq!(saver[0].url, "https://node.example/data-saver/abc/1.jpg");
}

// a response without baseUrl is a parse failure, not a panic
#[test]
fn test_parse_chapter_pages_missing_base_url_is_error() {
    let json = serde_json::json!({ "chapter": { "hash": "abc", "data": [] } });

    assert!(parse_chapter_pages(&json, PageQuality::Data).is_err());
}

// tags group under their group attribute, defaulting to Other
#[test]
fn test_parse_tags_groups_by_group() {
    let json =
        serde_json::json!({
        "data": [
            {
                "id": "tag-1",
                "attributes": { "name": { "en": "Action" }, "group": "genre" }
            },
            {
                "id": "tag-2",
                "attributes": { "name": { "en": "School Life" }, "group": "theme" }
            },
            {
                "id": "tag-3",
                "attributes": { "name": { "en": "Oneshot" } }
            }
        ]
    });

    let groups = parse_tags(&json).unwrap();

    assert_eq!(groups["genre"][0].name, "Action");
    assert_eq!(groups["theme"][0].name, "School Life");
    assert_eq!(groups["Other"][0].name, "Oneshot");
}

// gallery pages parse image url and rating, tolerating junk entries
#[test]
fn test_parse_gallery_page_reads_items() {
    let json =
        serde_json::json!({
        "items": [
            { "image_url": "https://img.example/1.png", "rating": "safe" },
            { "image_url": "https://img.example/2.png", "rating": "explicit" }
        ],
        "count": 2
    });

    let page = parse_gallery_page(&json).unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].image_url, "https://img.example/1.png");
    assert_eq!(page.items[1].rating, "explicit");
    assert_eq!(page.total, Some(2));
}

// missing attributes read back as neutral defaults
#[test]
fn test_get_attr_helpers_default_on_missing() {
    let json = serde_json::json!({ "pages": 10, "chapter": "4" });

    assert_eq!(get_attr_as_str(&json, "chapter"), "4");
    assert_eq!(get_attr_as_str(&json, "title"), "");
    assert_eq!(get_attr_as_u64(&json, "pages"), 10);
    assert_eq!(get_attr_as_u64(&json, "missing"), 0);
}
