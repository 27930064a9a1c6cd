use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
    download,
    error::{ suspend_error, MreadError },
    favorites::Favorites,
    getter::{ self, FeedQuery, MangaQuery },
    log,
    metadata::{
        Chapter,
        GalleryImage,
        Manga,
        PageImage,
        PageQuality,
        Preferences,
        ResourcePage,
        SortKey,
        SortOrder,
        Tag,
    },
    pagination::{ fetch_kind, PageSource, PageState, Paginator },
    progress::Progress,
    resolute,
    settings::Settings,
    utils,
};

pub(crate) const HOME_RAIL_LIMIT: u32 = 10;
pub(crate) const EXPLORE_PAGE_LIMIT: u32 = 32;
pub(crate) const SEARCH_LIMIT: u32 = 10;
pub(crate) const FEED_PAGE_LIMIT: u32 = 100;
pub(crate) const GALLERY_PAGE_LIMIT: u32 = 20;

fn enter_screen(name: &str) {
    *resolute::CURRENT_SCREEN.lock() = String::from(name);
    log!(&format!("entering {}", name), name);
}

fn display_language(preferences: &Preferences) -> String {
    match preferences.selected_languages.first() {
        Some(language) => language.clone(),
        None => String::from("en"),
    }
}

/// Three fixed rails of the landing screen, refreshed together.
#[derive(Clone, Debug, Default)]
pub(crate) struct HomeRails {
    pub(crate) popular: Vec<Manga>,
    pub(crate) new_releases: Vec<Manga>,
    pub(crate) new_chapters: Vec<Manga>,
}

pub(crate) struct HomeScreen {
    client: reqwest::Client,
    settings: Arc<Settings>,
    rails: Mutex<HomeRails>,
}

impl HomeScreen {
    pub(crate) fn new(client: reqwest::Client, settings: Arc<Settings>) -> HomeScreen {
        HomeScreen {
            client,
            settings,
            rails: Mutex::new(HomeRails::default()),
        }
    }

    pub(crate) async fn refresh(&self) {
        enter_screen("home");
        let ratings = self.settings.content_ratings();
        let popular_query = MangaQuery::new(
            HOME_RAIL_LIMIT,
            SortKey::Rating,
            SortOrder::Desc,
            ratings.clone()
        );
        let new_query = MangaQuery::new(
            HOME_RAIL_LIMIT,
            SortKey::CreatedAt,
            SortOrder::Desc,
            ratings.clone()
        );
        let updated_query = MangaQuery::new(
            HOME_RAIL_LIMIT,
            SortKey::LatestUploadedChapter,
            SortOrder::Desc,
            ratings
        );
        let (popular, new_releases, new_chapters) = futures::join!(
            getter::get_manga_list(&self.client, &popular_query),
            getter::get_manga_list(&self.client, &new_query),
            getter::get_manga_list(&self.client, &updated_query)
        );
        let mut rails = self.rails.lock();
        match popular {
            Ok(page) => {
                rails.popular = page.items;
            }
            Err(err) => suspend_error(err, "home popular"),
        }
        match new_releases {
            Ok(page) => {
                rails.new_releases = page.items;
            }
            Err(err) => suspend_error(err, "home new releases"),
        }
        match new_chapters {
            Ok(page) => {
                rails.new_chapters = page.items;
            }
            Err(err) => suspend_error(err, "home new chapters"),
        }
    }

    pub(crate) fn rails(&self) -> HomeRails {
        self.rails.lock().clone()
    }

    pub(crate) fn display_language(&self) -> String {
        display_language(&self.settings.current())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ExploreFilters {
    pub(crate) selected_tags: Vec<String>,
    pub(crate) sort: SortKey,
    pub(crate) order: SortOrder,
}

impl Default for ExploreFilters {
    fn default() -> ExploreFilters {
        ExploreFilters {
            selected_tags: Vec::new(),
            sort: SortKey::Rating,
            order: SortOrder::Desc,
        }
    }
}

/// Catalog listing source; reads the filter state and the content-rating
/// allow-set at fetch time, so a paginator reset plus refresh is enough
/// after any filter change.
pub(crate) struct CatalogSource {
    client: reqwest::Client,
    settings: Arc<Settings>,
    filters: Arc<Mutex<ExploreFilters>>,
}

impl PageSource<Manga> for CatalogSource {
    async fn fetch_page(&self, offset: u32, limit: u32) -> Result<ResourcePage<Manga>, MreadError> {
        let mut query = {
            let filters = self.filters.lock();
            let mut query = MangaQuery::new(
                limit,
                filters.sort,
                filters.order,
                self.settings.content_ratings()
            );
            query.included_tags = filters.selected_tags.clone();
            query
        };
        query.offset = offset;
        getter::get_manga_list(&self.client, &query).await
    }
}

pub(crate) struct ExploreScreen {
    client: reqwest::Client,
    filters: Arc<Mutex<ExploreFilters>>,
    tags: Mutex<BTreeMap<String, Vec<Tag>>>,
    paginator: Paginator<Manga, CatalogSource>,
}

impl ExploreScreen {
    pub(crate) fn new(client: reqwest::Client, settings: Arc<Settings>) -> ExploreScreen {
        let filters = Arc::new(Mutex::new(ExploreFilters::default()));
        let source = CatalogSource {
            client: client.clone(),
            settings,
            filters: filters.clone(),
        };
        ExploreScreen {
            client,
            filters,
            tags: Mutex::new(BTreeMap::new()),
            paginator: Paginator::append(source, EXPLORE_PAGE_LIMIT),
        }
    }

    pub(crate) async fn refresh(&self) -> bool {
        enter_screen("explore");
        self.paginator.refresh().await
    }

    pub(crate) async fn load_more(&self) -> bool {
        self.paginator.load_more().await
    }

    /// Tag catalog for the filter sheet, grouped the way the API groups
    /// them; a fetch failure keeps whatever was loaded before.
    pub(crate) async fn load_tags(&self) {
        match getter::get_tags(&self.client).await {
            Ok(groups) => {
                *self.tags.lock() = groups;
            }
            Err(err) => suspend_error(err, "explore tags"),
        }
    }

    pub(crate) fn tag_groups(&self) -> BTreeMap<String, Vec<Tag>> {
        self.tags.lock().clone()
    }

    /// Flips one tag in the AND-combined include set and rewinds the list;
    /// the caller refreshes explicitly afterwards.
    pub(crate) fn toggle_tag(&self, tag_id: &str) {
        {
            let mut filters = self.filters.lock();
            if let Some(position) = filters.selected_tags.iter().position(|id| id == tag_id) {
                filters.selected_tags.remove(position);
            } else {
                filters.selected_tags.push(tag_id.to_owned());
            }
        }
        self.paginator.reset();
    }

    pub(crate) fn set_sort(&self, sort: SortKey, order: SortOrder) {
        {
            let mut filters = self.filters.lock();
            filters.sort = sort;
            filters.order = order;
        }
        self.paginator.reset();
    }

    pub(crate) fn selected_tags(&self) -> Vec<String> {
        self.filters.lock().selected_tags.clone()
    }

    pub(crate) fn items(&self) -> Vec<Manga> {
        self.paginator.items()
    }

    pub(crate) fn state(&self) -> PageState {
        self.paginator.state()
    }

    pub(crate) fn has_more(&self) -> bool {
        self.paginator.has_more()
    }
}

pub(crate) struct SearchScreen {
    client: reqwest::Client,
    settings: Arc<Settings>,
    query: Mutex<String>,
    results: Mutex<Vec<Manga>>,
    state: Mutex<PageState>,
}

impl SearchScreen {
    pub(crate) fn new(client: reqwest::Client, settings: Arc<Settings>) -> SearchScreen {
        SearchScreen {
            client,
            settings,
            query: Mutex::new(String::new()),
            results: Mutex::new(Vec::new()),
            state: Mutex::new(PageState::Idle),
        }
    }

    pub(crate) fn set_query(&self, query: &str) {
        *self.query.lock() = query.to_owned();
    }

    /// Title search; a pasted title URL or bare UUID skips the search and
    /// resolves the manga directly.
    pub(crate) async fn search(&self) -> bool {
        let query = self.query.lock().clone();
        if query.is_empty() {
            return false;
        }
        enter_screen("search");
        *self.state.lock() = PageState::Loading;
        let result = match utils::extract_manga_id(&query) {
            Some(id) =>
                getter
                    ::get_manga(&self.client, &id).await
                    .map(|manga| vec![manga]),
            None => {
                let mut search = MangaQuery::new(
                    SEARCH_LIMIT,
                    SortKey::Rating,
                    SortOrder::Desc,
                    self.settings.content_ratings()
                );
                search.title = Some(query);
                getter::get_manga_list(&self.client, &search).await.map(|page| page.items)
            }
        };
        match result {
            Ok(results) => {
                *self.results.lock() = results;
                *self.state.lock() = PageState::Loaded;
                true
            }
            Err(err) => {
                *self.state.lock() = PageState::Failed {
                    kind: fetch_kind(&err),
                    message: err.to_string(),
                };
                false
            }
        }
    }

    pub(crate) fn results(&self) -> Vec<Manga> {
        self.results.lock().clone()
    }

    pub(crate) fn state(&self) -> PageState {
        self.state.lock().clone()
    }
}

/// Chapter feed source of one manga; selected translation languages are
/// read from preferences at fetch time.
pub(crate) struct FeedSource {
    client: reqwest::Client,
    settings: Arc<Settings>,
    manga_id: String,
}

impl PageSource<Chapter> for FeedSource {
    async fn fetch_page(
        &self,
        offset: u32,
        limit: u32
    ) -> Result<ResourcePage<Chapter>, MreadError> {
        let query = FeedQuery {
            manga_id: self.manga_id.clone(),
            limit,
            offset,
            languages: self.settings.current().selected_languages,
            readable_only: true,
        };
        getter::get_manga_feed(&self.client, &query).await
    }
}

/// One feed entry annotated for rendering.
#[derive(Clone, Debug)]
pub(crate) struct ChapterRow {
    pub(crate) chapter: Chapter,
    pub(crate) read: bool,
    pub(crate) last_read: bool,
}

pub(crate) struct MangaDetailsScreen<S> {
    manga: Manga,
    settings: Arc<Settings>,
    favorites: Arc<Favorites>,
    progress: Arc<Progress>,
    feed: Paginator<Chapter, S>,
}

impl MangaDetailsScreen<FeedSource> {
    pub(crate) fn open(
        client: reqwest::Client,
        settings: Arc<Settings>,
        favorites: Arc<Favorites>,
        progress: Arc<Progress>,
        manga: Manga
    ) -> MangaDetailsScreen<FeedSource> {
        let source = FeedSource {
            client,
            settings: settings.clone(),
            manga_id: manga.id.clone(),
        };
        MangaDetailsScreen::new(manga, settings, favorites, progress, source)
    }
}

impl<S: PageSource<Chapter>> MangaDetailsScreen<S> {
    pub(crate) fn new(
        manga: Manga,
        settings: Arc<Settings>,
        favorites: Arc<Favorites>,
        progress: Arc<Progress>,
        source: S
    ) -> MangaDetailsScreen<S> {
        MangaDetailsScreen {
            manga,
            settings,
            favorites,
            progress,
            feed: Paginator::append(source, FEED_PAGE_LIMIT),
        }
    }

    pub(crate) fn manga(&self) -> &Manga {
        &self.manga
    }

    pub(crate) fn title(&self) -> String {
        self.manga.title(&display_language(&self.settings.current()))
    }

    pub(crate) fn cover_url(&self) -> String {
        download::get_cover_url_or_placeholder(&self.manga)
    }

    pub(crate) async fn refresh(&self) -> bool {
        enter_screen("details");
        self.feed.refresh().await
    }

    pub(crate) async fn load_more_chapters(&self) -> bool {
        self.feed.load_more().await
    }

    pub(crate) fn has_more_chapters(&self) -> bool {
        self.feed.has_more()
    }

    pub(crate) fn feed_state(&self) -> PageState {
        self.feed.state()
    }

    /// Loaded feed in reading order, annotated with read state and the
    /// last-read marker.
    pub(crate) async fn chapter_rows(&self) -> Vec<ChapterRow> {
        let progress = self.progress.get_progress(&self.manga.id).await;
        let mut chapters = self.feed.items();
        utils::sort_chapters(&mut chapters);
        chapters
            .into_iter()
            .map(|chapter| ChapterRow {
                read: progress.is_read(&chapter.id),
                last_read: progress.last_read.as_deref() == Some(chapter.id.as_str()),
                chapter,
            })
            .collect()
    }

    pub(crate) async fn is_favorite(&self) -> bool {
        self.favorites.contains(&self.manga.id).await
    }

    /// Flips favorite membership; returns whether the manga is a favorite
    /// afterwards.
    pub(crate) async fn toggle_favorite(&self) -> Result<bool, MreadError> {
        if self.favorites.contains(&self.manga.id).await {
            match self.favorites.remove(&self.manga.id).await {
                Ok(()) => Ok(false),
                Err(err) => Err(err),
            }
        } else {
            match self.favorites.add(&self.manga).await {
                Ok(()) => Ok(true),
                Err(err) => Err(err),
            }
        }
    }

    pub(crate) async fn mark_read(&self, chapter_id: &str) -> Result<(), MreadError> {
        self.progress.mark_read(&self.manga.id, chapter_id).await
    }
}

pub(crate) struct ChapterScreen {
    client: reqwest::Client,
    progress: Arc<Progress>,
    manga_id: String,
    chapter_id: String,
    quality: PageQuality,
    pages: Mutex<Vec<PageImage>>,
    state: Mutex<PageState>,
}

impl ChapterScreen {
    pub(crate) fn new(
        client: reqwest::Client,
        progress: Arc<Progress>,
        manga_id: &str,
        chapter_id: &str,
        quality: PageQuality
    ) -> ChapterScreen {
        ChapterScreen {
            client,
            progress,
            manga_id: manga_id.to_owned(),
            chapter_id: chapter_id.to_owned(),
            quality,
            pages: Mutex::new(Vec::new()),
            state: Mutex::new(PageState::Idle),
        }
    }

    /// Resolves the page images and records the chapter as read. A storage
    /// failure while recording stays invisible here; the pages still open.
    pub(crate) async fn load(&self) -> bool {
        enter_screen("chapter");
        *self.state.lock() = PageState::Loading;
        match getter::get_chapter_pages(&self.client, &self.chapter_id, self.quality).await {
            Ok(pages) => {
                *self.pages.lock() = pages;
                *self.state.lock() = PageState::Loaded;
                match self.progress.mark_read(&self.manga_id, &self.chapter_id).await {
                    Ok(()) => (),
                    Err(err) => suspend_error(err, "chapter mark read"),
                }
                true
            }
            Err(err) => {
                *self.state.lock() = PageState::Failed {
                    kind: fetch_kind(&err),
                    message: err.to_string(),
                };
                false
            }
        }
    }

    pub(crate) fn pages(&self) -> Vec<PageImage> {
        self.pages.lock().clone()
    }

    /// Called once an image has been measured; refines the natural size of
    /// that page.
    pub(crate) fn set_page_dimensions(&self, index: usize, width: u32, height: u32) {
        if let Some(page) = self.pages.lock().get_mut(index) {
            page.set_dimensions(width, height);
        }
    }

    pub(crate) fn state(&self) -> PageState {
        self.state.lock().clone()
    }
}

pub(crate) fn filter_gallery(
    items: Vec<GalleryImage>,
    adult_content_enabled: bool
) -> Vec<GalleryImage> {
    if adult_content_enabled {
        return items;
    }
    items
        .into_iter()
        .filter(|image| image.rating == "safe")
        .collect()
}

pub(crate) struct GallerySource {
    client: reqwest::Client,
    settings: Arc<Settings>,
}

impl PageSource<GalleryImage> for GallerySource {
    async fn fetch_page(
        &self,
        offset: u32,
        limit: u32
    ) -> Result<ResourcePage<GalleryImage>, MreadError> {
        let page = match getter::get_gallery_page(&self.client, offset, limit).await {
            Ok(page) => page,
            Err(err) => {
                return Err(err);
            }
        };
        Ok(ResourcePage {
            items: filter_gallery(page.items, self.settings.current().adult_content_enabled),
            total: page.total,
        })
    }
}

pub(crate) struct GalleryScreen<S> {
    paginator: Paginator<GalleryImage, S>,
}

impl GalleryScreen<GallerySource> {
    pub(crate) fn open(
        client: reqwest::Client,
        settings: Arc<Settings>
    ) -> GalleryScreen<GallerySource> {
        GalleryScreen::new(GallerySource { client, settings }, GALLERY_PAGE_LIMIT)
    }
}

impl<S: PageSource<GalleryImage>> GalleryScreen<S> {
    pub(crate) fn new(source: S, limit: u32) -> GalleryScreen<S> {
        GalleryScreen {
            paginator: Paginator::paged(source, limit),
        }
    }

    pub(crate) async fn refresh(&self) -> bool {
        enter_screen("gallery");
        self.paginator.refresh().await
    }

    pub(crate) async fn next_page(&self) -> bool {
        self.paginator.next_page().await
    }

    pub(crate) async fn previous_page(&self) -> bool {
        self.paginator.previous_page().await
    }

    pub(crate) fn images(&self) -> Vec<GalleryImage> {
        self.paginator.items()
    }

    pub(crate) fn current_page(&self) -> u32 {
        self.paginator.current_page()
    }

    pub(crate) fn state(&self) -> PageState {
        self.paginator.state()
    }
}

pub(crate) struct FavoritesScreen {
    favorites: Arc<Favorites>,
    settings: Arc<Settings>,
    items: Mutex<Vec<Manga>>,
}

impl FavoritesScreen {
    pub(crate) fn new(favorites: Arc<Favorites>, settings: Arc<Settings>) -> FavoritesScreen {
        FavoritesScreen {
            favorites,
            settings,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Called by the host every time the screen becomes visible.
    pub(crate) async fn refresh(&self) {
        enter_screen("favorites");
        *self.items.lock() = self.favorites.list().await;
    }

    pub(crate) fn items(&self) -> Vec<Manga> {
        self.items.lock().clone()
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        let language = display_language(&self.settings.current());
        self.items
            .lock()
            .iter()
            .map(|manga| manga.title(&language))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::KeyValueStore;
    use crate::favorites::manga_for_test;
    use std::collections::VecDeque;

    struct ScriptFeed {
        pages: Mutex<VecDeque<ResourcePage<Chapter>>>,
    }

    impl PageSource<Chapter> for ScriptFeed {
        async fn fetch_page(
            &self,
            _offset: u32,
            _limit: u32
        ) -> Result<ResourcePage<Chapter>, MreadError> {
            match self.pages.lock().pop_front() {
                Some(page) => Ok(page),
                None => Ok(ResourcePage { items: Vec::new(), total: None }),
            }
        }
    }

    struct ScriptGallery;

    impl PageSource<GalleryImage> for ScriptGallery {
        async fn fetch_page(
            &self,
            offset: u32,
            limit: u32
        ) -> Result<ResourcePage<GalleryImage>, MreadError> {
            let items = (0..limit)
                .map(|i| GalleryImage {
                    image_url: format!("https://img.example/{}.png", offset + i),
                    rating: String::from("safe"),
                })
                .collect();
            Ok(ResourcePage { items, total: None })
        }
    }

    fn chapter(id: &str, number: &str) -> Chapter {
        Chapter {
            id: String::from(id),
            manga_id: String::from("manga-1"),
            chapter: String::from(number),
            title: None,
            pages: 12,
            publish_at: None,
            translated_language: String::from("en"),
        }
    }

    async fn details_screen(
        chapters: Vec<Chapter>
    ) -> MangaDetailsScreen<ScriptFeed> {
        let store = Arc::new(KeyValueStore::open_in_memory().unwrap());
        let settings = Arc::new(Settings::load(store.clone()).await);
        let favorites = Arc::new(Favorites::new(store.clone()));
        let progress = Arc::new(Progress::new(store));
        let source = ScriptFeed {
            pages: Mutex::new(
                vec![ResourcePage { items: chapters, total: None }].into()
            ),
        };
        MangaDetailsScreen::new(
            manga_for_test("manga-1", "First"),
            settings,
            favorites,
            progress,
            source
        )
    }

    // chapter rows carry read state and the last-read marker
    #[tokio::test]
    async fn test_chapter_rows_annotate_progress() {
        let screen = details_screen(
            vec![chapter("ch-1", "1"), chapter("ch-2", "2"), chapter("ch-3", "3")]
        ).await;
        screen.refresh().await;

        screen.mark_read("ch-1").await.unwrap();
        screen.mark_read("ch-2").await.unwrap();

        let rows = screen.chapter_rows().await;
        assert_eq!(rows.len(), 3);
        assert!(rows[0].read);
        assert!(!rows[0].last_read);
        assert!(rows[1].read);
        assert!(rows[1].last_read);
        assert!(!rows[2].read);
        assert!(!rows[2].last_read);
    }

    // rows come back in reading order even when the feed arrives shuffled
    #[tokio::test]
    async fn test_chapter_rows_are_sorted() {
        let screen = details_screen(
            vec![chapter("ch-10", "10"), chapter("ch-2", "2")]
        ).await;
        screen.refresh().await;

        let rows = screen.chapter_rows().await;

        assert_eq!(rows[0].chapter.chapter, "2");
        assert_eq!(rows[1].chapter.chapter, "10");
    }

    // the favorite toggle flips membership both ways
    #[tokio::test]
    async fn test_toggle_favorite_round_trip() {
        let screen = details_screen(Vec::new()).await;

        assert!(!screen.is_favorite().await);
        assert!(screen.toggle_favorite().await.unwrap());
        assert!(screen.is_favorite().await);
        assert!(!screen.toggle_favorite().await.unwrap());
        assert!(!screen.is_favorite().await);
    }

    // measuring a page refines its natural size in place
    #[tokio::test]
    async fn test_set_page_dimensions_refines_loaded_page() {
        let store = Arc::new(KeyValueStore::open_in_memory().unwrap());
        let screen = ChapterScreen::new(
            reqwest::Client::new(),
            Arc::new(Progress::new(store)),
            "manga-1",
            "ch-1",
            PageQuality::Data
        );
        *screen.pages.lock() = vec![
            PageImage::new(0, String::from("https://node.example/data/abc/1.png"))
        ];

        screen.set_page_dimensions(0, 1080, 1528);
        // out-of-range indices are ignored
        screen.set_page_dimensions(7, 1, 1);

        let pages = screen.pages();
        assert_eq!(pages[0].width, Some(1080));
        assert_eq!(pages[0].height, Some(1528));
    }

    // non-safe gallery images disappear while adult content is off
    #[test]
    fn test_filter_gallery_drops_unsafe_without_adult_content() {
        let items = vec![
            GalleryImage {
                image_url: String::from("https://img.example/1.png"),
                rating: String::from("safe"),
            },
            GalleryImage {
                image_url: String::from("https://img.example/2.png"),
                rating: String::from("explicit"),
            }
        ];

        let filtered = filter_gallery(items.clone(), false);
        let unfiltered = filter_gallery(items, true);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].rating, "safe");
        assert_eq!(unfiltered.len(), 2);
    }

    // gallery paging replaces the image list page by page
    #[tokio::test]
    async fn test_gallery_screen_pages_replace() {
        let screen = GalleryScreen::new(ScriptGallery, 4);

        screen.refresh().await;
        assert_eq!(screen.current_page(), 1);
        let first = screen.images();
        assert_eq!(first.len(), 4);
        assert!(first[0].image_url.ends_with("/0.png"));

        screen.next_page().await;
        assert_eq!(screen.current_page(), 2);
        assert!(screen.images()[0].image_url.ends_with("/4.png"));

        screen.previous_page().await;
        assert_eq!(screen.current_page(), 1);

        // already on the first page, nothing to go back to
        assert!(!screen.previous_page().await);
    }
}
