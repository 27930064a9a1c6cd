use std::{ io::Write, process::exit, sync::Arc, time::Duration };
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod db;
mod download;
mod error;
mod favorites;
mod getter;
mod macros;
mod metadata;
mod pagination;
mod progress;
mod resolute;
mod screens;
mod settings;
mod utils;

use crate::{
    db::KeyValueStore,
    error::{ handle_error, handle_suspended, MreadError },
    favorites::Favorites,
    metadata::{ Manga, PageQuality, PreferencesUpdate, SortKey, SortOrder },
    pagination::PageState,
    progress::Progress,
    screens::{
        ExploreScreen,
        FavoritesScreen,
        FeedSource,
        GalleryScreen,
        HomeScreen,
        MangaDetailsScreen,
        SearchScreen,
    },
    settings::Settings,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    match start().await {
        Ok(()) => (),
        Err(err) => {
            handle_error(&err, String::from("program"));
            handle_suspended();
            exit(1);
        }
    }
    handle_suspended();
}

async fn start() -> Result<(), MreadError> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    *resolute::HANDLE_ID.lock() = Uuid::new_v4().to_string().into_boxed_str();
    log!("starting mread");

    let db_path = match getter::get_db_path() {
        Ok(path) => path,
        Err(err) => {
            return Err(err);
        }
    };
    let store = match KeyValueStore::open(&db_path) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            return Err(err);
        }
    };
    let settings = Arc::new(Settings::load(store.clone()).await);
    settings.subscribe(
        Box::new(|preferences| {
            tracing::info!(
                "preferences updated; theme {} adult {}",
                preferences.theme,
                preferences.adult_content_enabled
            );
        })
    );
    let favorites = Arc::new(Favorites::new(store.clone()));
    let progress = Arc::new(Progress::new(store));

    let client = match download::get_client(REQUEST_TIMEOUT) {
        Ok(client) => client,
        Err(err) => {
            return Err(MreadError::NetworkError(err));
        }
    };

    let home = HomeScreen::new(client.clone(), settings.clone());
    let explore = ExploreScreen::new(client.clone(), settings.clone());
    let search = SearchScreen::new(client.clone(), settings.clone());
    let gallery = GalleryScreen::open(client.clone(), settings.clone());
    let favorites_screen = FavoritesScreen::new(favorites.clone(), settings.clone());

    // root view
    home.refresh().await;
    print_home(&home);

    let mut selection: Vec<Manga> = home.rails().popular;
    let mut details: Option<MangaDetailsScreen<FeedSource>> = None;
    print_help();

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => {
                break;
            }
            Ok(_) => (),
            Err(err) => {
                return Err(MreadError::IoError(err, None));
            }
        }
        let line = line.trim();
        let (command, argument) = match line.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };
        match command {
            "home" => {
                home.refresh().await;
                print_home(&home);
                selection = home.rails().popular;
            }
            "explore" => {
                if explore.items().is_empty() {
                    explore.load_tags().await;
                    explore.refresh().await;
                } else {
                    explore.load_more().await;
                }
                selection = explore.items();
                print_list("Explore", &selection, &home.display_language());
                print_state(&explore.state());
                if !explore.has_more() {
                    println!("End of the catalog for these filters.");
                }
            }
            "tags" => {
                for (group, tags) in explore.tag_groups() {
                    println!("{}", group);
                    for tag in tags {
                        println!("  {}  {}", tag.id, tag.name);
                    }
                }
            }
            "tag" => {
                if argument.is_empty() {
                    println!("Usage: tag <tag-id>");
                    continue;
                }
                explore.toggle_tag(argument);
                explore.refresh().await;
                selection = explore.items();
                println!("Selected tags: {:?}", explore.selected_tags());
                print_list("Explore", &selection, &home.display_language());
            }
            "sort" => {
                let sort = match argument {
                    "rating" => Some(SortKey::Rating),
                    "new" => Some(SortKey::CreatedAt),
                    "updated" => Some(SortKey::LatestUploadedChapter),
                    _ => None,
                };
                match sort {
                    Some(sort) => {
                        explore.set_sort(sort, SortOrder::Desc);
                        explore.refresh().await;
                        selection = explore.items();
                        print_list("Explore", &selection, &home.display_language());
                    }
                    None => println!("Usage: sort <rating|new|updated>"),
                }
            }
            "search" => {
                if argument.is_empty() {
                    println!("Usage: search <title or mangadex url>");
                    continue;
                }
                search.set_query(argument);
                search.search().await;
                selection = search.results();
                print_list("Search", &selection, &home.display_language());
                print_state(&search.state());
            }
            "open" => {
                let manga = match parse_index(argument).and_then(|index| selection.get(index)) {
                    Some(manga) => manga.clone(),
                    None => {
                        println!("Usage: open <number from the last list>");
                        continue;
                    }
                };
                let screen = MangaDetailsScreen::open(
                    client.clone(),
                    settings.clone(),
                    favorites.clone(),
                    progress.clone(),
                    manga
                );
                screen.refresh().await;
                print_details(&screen).await;
                details = Some(screen);
            }
            "chapters" => {
                match &details {
                    Some(screen) => {
                        screen.load_more_chapters().await;
                        print_details(screen).await;
                    }
                    None => println!("Open a manga first."),
                }
            }
            "fav" => {
                match &details {
                    Some(screen) =>
                        match screen.toggle_favorite().await {
                            Ok(true) => println!("Added to favorites."),
                            Ok(false) => println!("Removed from favorites."),
                            Err(err) => handle_error(&err, String::from("favorites")),
                        }
                    None => println!("Open a manga first."),
                }
            }
            "read" => {
                let screen = match &details {
                    Some(screen) => screen,
                    None => {
                        println!("Open a manga first.");
                        continue;
                    }
                };
                let rows = screen.chapter_rows().await;
                let row = match parse_index(argument).and_then(|index| rows.get(index)) {
                    Some(row) => row,
                    None => {
                        println!("Usage: read <number from the chapter list>");
                        continue;
                    }
                };
                let reader = screens::ChapterScreen::new(
                    client.clone(),
                    progress.clone(),
                    &screen.manga().id,
                    &row.chapter.id,
                    PageQuality::Data
                );
                reader.load().await;
                print_state(&reader.state());
                let pages = reader.pages();
                println!("{} pages", pages.len());
                for page in pages.iter().take(3) {
                    println!("  {}  {}", page.index, page.url);
                }
            }
            "favorites" => {
                favorites_screen.refresh().await;
                selection = favorites_screen.items();
                let titles = favorites_screen.titles();
                if titles.is_empty() {
                    println!("No favorites added yet.");
                } else {
                    println!("Your Favorites");
                    for (index, title) in titles.iter().enumerate() {
                        println!("  {}  {}", index, title);
                    }
                }
            }
            "gallery" => {
                match argument {
                    "next" => {
                        gallery.next_page().await;
                    }
                    "prev" => {
                        gallery.previous_page().await;
                    }
                    _ => {
                        gallery.refresh().await;
                    }
                }
                println!("Gallery page {}", gallery.current_page());
                for image in gallery.images().iter().take(5) {
                    println!("  {}", image.image_url);
                }
                print_state(&gallery.state());
            }
            "adult" => {
                let enabled = !settings.current().adult_content_enabled;
                match
                    settings.update(PreferencesUpdate {
                        adult_content_enabled: Some(enabled),
                        ..PreferencesUpdate::default()
                    }).await
                {
                    Ok(preferences) =>
                        println!("Adult content: {}", preferences.adult_content_enabled),
                    Err(err) => handle_error(&err, String::from("settings")),
                }
            }
            "lang" => {
                if argument.is_empty() {
                    println!("Usage: lang <code> [<code> ...]");
                    continue;
                }
                let languages = argument
                    .split_whitespace()
                    .map(|language| language.to_owned())
                    .collect();
                match
                    settings.update(PreferencesUpdate {
                        selected_languages: Some(languages),
                        ..PreferencesUpdate::default()
                    }).await
                {
                    Ok(preferences) =>
                        println!("Languages: {:?}", preferences.selected_languages),
                    Err(err) => handle_error(&err, String::from("settings")),
                }
            }
            "theme" => {
                if argument.is_empty() {
                    println!("Current theme: {}", settings.current().theme);
                    continue;
                }
                match
                    settings.update(PreferencesUpdate {
                        theme: Some(argument.to_owned()),
                        ..PreferencesUpdate::default()
                    }).await
                {
                    Ok(preferences) => println!("Theme: {}", preferences.theme),
                    Err(err) => handle_error(&err, String::from("settings")),
                }
            }
            "help" => print_help(),
            "quit" | "q" => {
                break;
            }
            "" => (),
            _ => println!("Unknown command; try help"),
        }
    }
    Ok(())
}

fn parse_index(argument: &str) -> Option<usize> {
    argument.parse::<usize>().ok()
}

fn print_home(home: &HomeScreen) {
    let rails = home.rails();
    let language = home.display_language();
    print_list("Most Popular", &rails.popular, &language);
    print_list("New Releases", &rails.new_releases, &language);
    print_list("New Chapter Uploaded", &rails.new_chapters, &language);
}

fn print_list(header: &str, list: &[Manga], language: &str) {
    println!("{}", header);
    if list.is_empty() {
        println!("  (nothing here)");
    }
    for (index, manga) in list.iter().enumerate() {
        println!("  {}  {}", index, manga.title(language));
    }
}

async fn print_details(screen: &MangaDetailsScreen<FeedSource>) {
    let manga = screen.manga();
    println!("{}", screen.title());
    println!("  {}", screen.cover_url());
    if let Some(year) = manga.year {
        println!("  {} / {:?}", year, manga.status);
    } else {
        println!("  {:?}", manga.status);
    }
    if !manga.description.is_empty() {
        println!("  {}", manga.description);
    }
    println!("  favorite: {}", screen.is_favorite().await);
    print_state(&screen.feed_state());
    let rows = screen.chapter_rows().await;
    for (index, row) in rows.iter().enumerate() {
        let read = if row.read { "x" } else { " " };
        let marker = if row.last_read { " <- last read" } else { "" };
        println!(
            "  {}  [{}] Ch.{} {}{}",
            index,
            read,
            row.chapter.chapter,
            row.chapter.title.as_deref().unwrap_or(""),
            marker
        );
    }
    if screen.has_more_chapters() {
        println!("  (more chapters available; chapters to load)");
    }
}

fn print_state(state: &PageState) {
    match state {
        PageState::Failed { kind, message } => {
            println!("Fetch failed ({:?}): {}; retry with the same command.", kind, message);
        }
        PageState::Idle | PageState::Loading | PageState::Loaded => (),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  home                      refresh the landing rails");
    println!("  explore                   browse the catalog (repeat to load more)");
    println!("  tags | tag <id>           list tag groups / toggle a tag filter");
    println!("  sort <rating|new|updated> change catalog ordering");
    println!("  search <text|url>         title search or open a mangadex url");
    println!("  open <n>                  open manga <n> from the last list");
    println!("  chapters                  load more chapters of the open manga");
    println!("  fav                       toggle favorite on the open manga");
    println!("  read <n>                  open chapter <n> of the open manga");
    println!("  favorites                 list favorites");
    println!("  gallery [next|prev]       browse the image gallery");
    println!("  adult | lang ... | theme  settings");
    println!("  quit");
}
