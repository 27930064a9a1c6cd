use chrono::{ DateTime, Utc };
use serde::{ Serialize, Deserialize };
use serde_json::Value;
use std::collections::{ BTreeMap, BTreeSet };

use crate::{ getter::{ get_attr_as_str, get_attr_as_u64 }, error::MreadError, resolute };

pub(crate) const UNTITLED: &str = "Untitled";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Status {
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl Status {
    pub(crate) fn from_str(value: &str) -> Status {
        match value {
            "ongoing" => Status::Ongoing,
            "completed" => Status::Completed,
            "hiatus" => Status::Hiatus,
            "cancelled" => Status::Cancelled,
            _ => Status::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ContentRating {
    Safe,
    Suggestive,
    Erotica,
    Pornographic,
}

impl ContentRating {
    pub(crate) fn as_param(&self) -> &'static str {
        match self {
            ContentRating::Safe => "safe",
            ContentRating::Suggestive => "suggestive",
            ContentRating::Erotica => "erotica",
            ContentRating::Pornographic => "pornographic",
        }
    }

    pub(crate) fn from_str(value: &str) -> ContentRating {
        match value {
            "suggestive" => ContentRating::Suggestive,
            "erotica" => ContentRating::Erotica,
            "pornographic" => ContentRating::Pornographic,
            _ => ContentRating::Safe,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SortKey {
    Rating,
    CreatedAt,
    LatestUploadedChapter,
}

impl SortKey {
    pub(crate) fn as_param(&self) -> &'static str {
        match self {
            SortKey::Rating => "rating",
            SortKey::CreatedAt => "createdAt",
            SortKey::LatestUploadedChapter => "latestUploadedChapter",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) fn as_param(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Image quality served by the at-home network; `DataSaver` trades quality
/// for download size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PageQuality {
    Data,
    DataSaver,
}

impl PageQuality {
    pub(crate) fn json_key(&self) -> &'static str {
        match self {
            PageQuality::Data => "data",
            PageQuality::DataSaver => "dataSaver",
        }
    }

    pub(crate) fn url_segment(&self) -> &'static str {
        match self {
            PageQuality::Data => "data",
            PageQuality::DataSaver => "data-saver",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct Tag {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) group: String,
}

impl Tag {
    pub(crate) fn new(id: &str, name: &str, group: &str) -> Tag {
        Tag {
            id: id.to_owned(),
            name: name.to_owned(),
            group: group.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct Relationship {
    pub(crate) id: String,
    pub(crate) kind: String,
    pub(crate) file_name: Option<String>,
}

impl Relationship {
    pub(crate) fn from_value(value: &Value) -> Relationship {
        Relationship {
            id: get_attr_as_str(value, "id").to_owned(),
            kind: get_attr_as_str(value, "type").to_owned(),
            file_name: value
                .get("attributes")
                .and_then(|attributes| attributes.get("fileName"))
                .and_then(Value::as_str)
                .map(|file_name| file_name.to_owned()),
        }
    }
}

/// One manga record as fetched from the catalog; immutable afterwards and
/// deduplicated by `id` everywhere.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct Manga {
    pub(crate) id: String,
    pub(crate) titles: BTreeMap<String, String>,
    pub(crate) description: String,
    pub(crate) year: Option<i32>,
    pub(crate) status: Status,
    pub(crate) content_rating: ContentRating,
    pub(crate) relationships: Vec<Relationship>,
}

impl Manga {
    pub(crate) fn from_value(value: &Value) -> Result<Manga, MreadError> {
        let id = match value.get("id").and_then(Value::as_str) {
            Some(id) => id.to_owned(),
            None => {
                return Err(MreadError::NotFoundError(String::from("manga id")));
            }
        };
        let attributes = match value.get("attributes") {
            Some(attributes) => attributes,
            None => {
                return Err(MreadError::NotFoundError(format!("attributes of manga {}", id)));
            }
        };

        let mut titles = BTreeMap::new();
        if let Some(title_map) = attributes.get("title").and_then(Value::as_object) {
            for (lang, title) in title_map.iter() {
                if let Some(title) = title.as_str() {
                    titles.insert(lang.clone(), title.to_owned());
                }
            }
        }
        // altTitles fill language slots the main title map does not cover
        if let Some(alt_titles) = attributes.get("altTitles").and_then(Value::as_array) {
            for alt_title in alt_titles {
                if let Some(entry) = alt_title.as_object() {
                    for (lang, title) in entry.iter() {
                        if let Some(title) = title.as_str() {
                            titles.entry(lang.clone()).or_insert_with(|| title.to_owned());
                        }
                    }
                }
            }
        }

        let description = attributes
            .get("description")
            .and_then(|description| {
                description
                    .get("en")
                    .or_else(|| {
                        description
                            .as_object()
                            .and_then(|map| map.values().next())
                    })
            })
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_owned();

        let relationships: Vec<Relationship> = match
            value.get("relationships").and_then(Value::as_array)
        {
            Some(relationships) => relationships.iter().map(Relationship::from_value).collect(),
            None => Vec::new(),
        };

        Ok(Manga {
            id,
            titles,
            description,
            year: attributes
                .get("year")
                .and_then(Value::as_i64)
                .map(|year| year as i32),
            status: Status::from_str(get_attr_as_str(attributes, "status")),
            content_rating: ContentRating::from_str(get_attr_as_str(attributes, "contentRating")),
            relationships,
        })
    }

    /// Display title in `lang`, falling back to the romanized title, then any
    /// available entry, then a fixed placeholder.
    pub(crate) fn title(&self, lang: &str) -> String {
        if let Some(title) = self.titles.get(lang) {
            return title.clone();
        }
        if let Some(title) = self.titles.get("ja-ro") {
            return title.clone();
        }
        match self.titles.values().next() {
            Some(title) => title.clone(),
            None => String::from(UNTITLED),
        }
    }

    pub(crate) fn cover_file(&self) -> Option<&str> {
        self.relationships
            .iter()
            .find(|relationship| relationship.kind == "cover_art")
            .and_then(|relationship| relationship.file_name.as_deref())
    }
}

/// One chapter of a manga feed; `pages == 0` marks an externally hosted
/// chapter that exists as metadata but cannot be opened in the reader.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Chapter {
    pub(crate) id: String,
    pub(crate) manga_id: String,
    pub(crate) chapter: String,
    pub(crate) title: Option<String>,
    pub(crate) pages: u64,
    pub(crate) publish_at: Option<DateTime<Utc>>,
    pub(crate) translated_language: String,
}

impl Chapter {
    pub(crate) fn from_value(manga_id: &str, value: &Value) -> Result<Chapter, MreadError> {
        let id = match value.get("id").and_then(Value::as_str) {
            Some(id) => id.to_owned(),
            None => {
                return Err(MreadError::NotFoundError(String::from("chapter id")));
            }
        };
        let attributes = match value.get("attributes") {
            Some(attributes) => attributes,
            None => {
                return Err(MreadError::NotFoundError(format!("attributes of chapter {}", id)));
            }
        };
        Ok(Chapter {
            id,
            manga_id: manga_id.to_owned(),
            chapter: get_attr_as_str(attributes, "chapter").to_owned(),
            title: attributes
                .get("title")
                .and_then(Value::as_str)
                .map(|title| title.to_owned()),
            pages: get_attr_as_u64(attributes, "pages"),
            publish_at: attributes
                .get("publishAt")
                .and_then(Value::as_str)
                .and_then(|publish_at| DateTime::parse_from_rfc3339(publish_at).ok())
                .map(|publish_at| publish_at.with_timezone(&Utc)),
            translated_language: get_attr_as_str(attributes, "translatedLanguage").to_owned(),
        })
    }

    pub(crate) fn is_readable(&self) -> bool {
        self.pages > 0
    }
}

/// One page image of an open chapter; `index` is the 0-based sort key.
/// Height is refined once the image has actually been loaded.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PageImage {
    pub(crate) index: usize,
    pub(crate) url: String,
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
}

impl PageImage {
    pub(crate) fn new(index: usize, url: String) -> PageImage {
        PageImage {
            index,
            url,
            width: None,
            height: None,
        }
    }

    pub(crate) fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = Some(width);
        self.height = Some(height);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct GalleryImage {
    pub(crate) image_url: String,
    pub(crate) rating: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub(crate) struct ReadProgress {
    pub(crate) last_read: Option<String>,
    pub(crate) read: BTreeSet<String>,
}

impl ReadProgress {
    pub(crate) fn is_read(&self, chapter_id: &str) -> bool {
        self.read.contains(chapter_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct Colors {
    pub(crate) header: String,
    pub(crate) accent: String,
}

impl Default for Colors {
    fn default() -> Colors {
        Colors {
            header: String::from("#f8f8f8"),
            accent: String::from("#FF5733"),
        }
    }
}

/// The one mutable preferences record of an installation; persisted after
/// every mutation and reloaded on startup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct Preferences {
    pub(crate) theme: String,
    pub(crate) colors: Colors,
    pub(crate) adult_content_enabled: bool,
    pub(crate) selected_languages: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Preferences {
        Preferences {
            theme: String::from("light"),
            colors: Colors::default(),
            adult_content_enabled: false,
            selected_languages: vec![String::from("en")],
        }
    }
}

impl Preferences {
    /// Ratings a catalog query may ask for; pornographic is never requested.
    pub(crate) fn content_ratings(&self) -> Vec<ContentRating> {
        let mut ratings = vec![ContentRating::Safe, ContentRating::Suggestive];
        if self.adult_content_enabled {
            ratings.push(ContentRating::Erotica);
        }
        ratings
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct PreferencesUpdate {
    pub(crate) theme: Option<String>,
    pub(crate) colors: Option<Colors>,
    pub(crate) adult_content_enabled: Option<bool>,
    pub(crate) selected_languages: Option<Vec<String>>,
}

/// One normalized page of a paginated remote resource.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ResourcePage<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct LOG {
    pub(crate) handle_id: String,
    pub(crate) message: String,
    pub(crate) time: String,
    pub(crate) name: String,
}

impl LOG {
    pub(crate) fn new(message: &str) -> LOG {
        let name = resolute::CURRENT_SCREEN.lock().clone();
        let handle_id = match resolute::HANDLE_ID.try_lock() {
            Some(handle) => handle.to_string(),
            None => String::new(),
        };
        LOG {
            handle_id,
            message: message.to_owned(),
            time: Utc::now().to_rfc3339(),
            name,
        }
    }

    pub(crate) fn new_with_name(message: &str, name: &str) -> LOG {
        let handle_id = match resolute::HANDLE_ID.try_lock() {
            Some(handle) => handle.to_string(),
            None => String::new(),
        };
        LOG {
            handle_id,
            message: message.to_owned(),
            time: Utc::now().to_rfc3339(),
            name: name.to_string(),
        }
    }
}

// status strings outside the known set map to unknown
#[test]
fn test_status_from_str_maps_unknown_values() {
    assert_eq!(Status::from_str("ongoing"), Status::Ongoing);
    assert_eq!(Status::from_str("axed"), Status::Unknown);
}

// title lookup prefers the requested language
#[test]
fn test_title_returns_requested_language() {
    let mut titles = BTreeMap::new();
    titles.insert(String::from("en"), String::from("English Title"));
    titles.insert(String::from("ja-ro"), String::from("Romanized Title"));
    let manga = Manga {
        id: String::from("x"),
        titles,
        description: String::new(),
        year: None,
        status: Status::Unknown,
        content_rating: ContentRating::Safe,
        relationships: Vec::new(),
    };

    assert_eq!(manga.title("en"), "English Title");
}

// title lookup falls back to the romanized title, then any entry, then the placeholder
#[test]
fn test_title_fallback_chain() {
    let mut titles = BTreeMap::new();
    titles.insert(String::from("ja-ro"), String::from("Romanized Title"));
    let mut manga = Manga {
        id: String::from("x"),
        titles,
        description: String::new(),
        year: None,
        status: Status::Unknown,
        content_rating: ContentRating::Safe,
        relationships: Vec::new(),
    };

    assert_eq!(manga.title("pl"), "Romanized Title");

    manga.titles.clear();
    manga.titles.insert(String::from("fr"), String::from("French Title"));
    assert_eq!(manga.title("pl"), "French Title");

    manga.titles.clear();
    assert_eq!(manga.title("pl"), UNTITLED);
}

// default ratings exclude erotica until adult content is enabled
#[test]
fn test_content_ratings_follow_adult_content_flag() {
    let mut preferences = Preferences::default();
    assert_eq!(
        preferences.content_ratings(),
        vec![ContentRating::Safe, ContentRating::Suggestive]
    );

    preferences.adult_content_enabled = true;
    assert_eq!(
        preferences.content_ratings(),
        vec![ContentRating::Safe, ContentRating::Suggestive, ContentRating::Erotica]
    );
    assert!(!preferences.content_ratings().contains(&ContentRating::Pornographic));
}
