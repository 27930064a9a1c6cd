use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{ db::KeyValueStore, error::{ suspend_error, MreadError }, metadata::Manga };

pub(crate) const FAVORITES_KEY: &str = "FAVORITES_MANGA_LIST";

/// Favorite manga collection, persisted as one JSON list of full manga
/// snapshots. The mutation mutex serializes read-modify-write cycles so
/// overlapping toggles cannot lose updates.
pub(crate) struct Favorites {
    store: Arc<KeyValueStore>,
    mutation: Mutex<()>,
}

impl Favorites {
    pub(crate) fn new(store: Arc<KeyValueStore>) -> Favorites {
        Favorites {
            store,
            mutation: Mutex::new(()),
        }
    }

    /// Reads the whole collection; a missing or unreadable value degrades to
    /// an empty list.
    pub(crate) async fn list(&self) -> Vec<Manga> {
        let value = match self.store.get(FAVORITES_KEY).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                return Vec::new();
            }
            Err(err) => {
                suspend_error(err, "favorites list");
                return Vec::new();
            }
        };
        match serde_json::from_value(value) {
            Ok(favorites) => favorites,
            Err(err) => {
                suspend_error(MreadError::JsonError(err.to_string()), "favorites list");
                Vec::new()
            }
        }
    }

    pub(crate) async fn contains(&self, id: &str) -> bool {
        self.list().await
            .iter()
            .any(|manga| manga.id == id)
    }

    /// Adds a manga to the collection. Adding an id that is already present
    /// replaces its snapshot with the latest-fetched attributes instead of
    /// creating a duplicate.
    pub(crate) async fn add(&self, manga: &Manga) -> Result<(), MreadError> {
        let _guard = self.mutation.lock().await;
        let mut favorites = self.list().await;
        match favorites.iter_mut().find(|entry| entry.id == manga.id) {
            Some(entry) => {
                *entry = manga.clone();
            }
            None => favorites.push(manga.clone()),
        }
        self.save(&favorites).await
    }

    /// Removes by id; removing a non-member is a no-op, not an error.
    pub(crate) async fn remove(&self, id: &str) -> Result<(), MreadError> {
        let _guard = self.mutation.lock().await;
        let mut favorites = self.list().await;
        let before = favorites.len();
        favorites.retain(|manga| manga.id != id);
        if favorites.len() == before {
            return Ok(());
        }
        self.save(&favorites).await
    }

    async fn save(&self, favorites: &[Manga]) -> Result<(), MreadError> {
        let value = match serde_json::to_value(favorites) {
            Ok(value) => value,
            Err(err) => {
                return Err(MreadError::JsonError(err.to_string()));
            }
        };
        self.store.set(FAVORITES_KEY, &value).await
    }
}

#[cfg(test)]
pub(crate) fn manga_for_test(id: &str, title: &str) -> Manga {
    use crate::metadata::{ ContentRating, Status };
    use std::collections::BTreeMap;

    let mut titles = BTreeMap::new();
    titles.insert(String::from("en"), String::from(title));
    Manga {
        id: String::from(id),
        titles,
        description: String::new(),
        year: None,
        status: Status::Ongoing,
        content_rating: ContentRating::Safe,
        relationships: Vec::new(),
    }
}

#[cfg(test)]
fn favorites_in_memory() -> Favorites {
    Favorites::new(Arc::new(KeyValueStore::open_in_memory().unwrap()))
}

// membership flips with add and remove, regardless of prior state
#[tokio::test]
async fn test_contains_follows_add_and_remove() {
    let favorites = favorites_in_memory();
    let manga = manga_for_test("manga-1", "First");

    assert!(!favorites.contains("manga-1").await);
    favorites.add(&manga).await.unwrap();
    assert!(favorites.contains("manga-1").await);
    favorites.remove("manga-1").await.unwrap();
    assert!(!favorites.contains("manga-1").await);
}

// double add keeps one entry and the latest snapshot wins
#[tokio::test]
async fn test_add_is_idempotent_and_overwrites() {
    let favorites = favorites_in_memory();

    favorites.add(&manga_for_test("manga-1", "Old Title")).await.unwrap();
    favorites.add(&manga_for_test("manga-1", "New Title")).await.unwrap();

    let list = favorites.list().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].title("en"), "New Title");
}

// removing an id that was never added changes nothing
#[tokio::test]
async fn test_remove_of_non_member_is_noop() {
    let favorites = favorites_in_memory();
    favorites.add(&manga_for_test("manga-1", "First")).await.unwrap();

    favorites.remove("manga-2").await.unwrap();

    assert_eq!(favorites.list().await.len(), 1);
}

// after a mixed add/remove sequence only net-positive ids remain, once each
#[tokio::test]
async fn test_add_remove_sequence_keeps_net_positive_ids() {
    let favorites = favorites_in_memory();

    favorites.add(&manga_for_test("manga-1", "First")).await.unwrap();
    favorites.add(&manga_for_test("manga-2", "Second")).await.unwrap();
    favorites.add(&manga_for_test("manga-1", "First")).await.unwrap();
    favorites.remove("manga-2").await.unwrap();
    favorites.add(&manga_for_test("manga-3", "Third")).await.unwrap();
    favorites.remove("manga-3").await.unwrap();
    favorites.add(&manga_for_test("manga-3", "Third")).await.unwrap();

    let mut ids: Vec<String> = favorites.list().await
        .into_iter()
        .map(|manga| manga.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec![String::from("manga-1"), String::from("manga-3")]);
}

// the collection survives a repository rebuild over the same store
#[tokio::test]
async fn test_list_survives_repository_rebuild() {
    let store = Arc::new(KeyValueStore::open_in_memory().unwrap());
    let favorites = Favorites::new(store.clone());
    favorites.add(&manga_for_test("manga-1", "First")).await.unwrap();

    let reopened = Favorites::new(store);

    assert!(reopened.contains("manga-1").await);
}

// concurrent toggles on the same collection never lose an update
#[tokio::test]
async fn test_concurrent_adds_do_not_lose_updates() {
    let favorites = Arc::new(favorites_in_memory());

    let mut handles = Vec::new();
    for i in 0..8 {
        let favorites = favorites.clone();
        handles.push(
            tokio::spawn(async move {
                let manga = manga_for_test(&format!("manga-{}", i), "Title");
                favorites.add(&manga).await.unwrap();
            })
        );
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(favorites.list().await.len(), 8);
}
