use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{ db::KeyValueStore, error::{ suspend_error, MreadError }, metadata::ReadProgress };

/// Per-manga reading progress. Every manga gets its own pair of keys so
/// loading progress for one title never deserializes the history of all
/// others.
pub(crate) struct Progress {
    store: Arc<KeyValueStore>,
    mutation: Mutex<()>,
}

fn last_read_key(manga_id: &str) -> String {
    format!("lastReadChapter_{}", manga_id)
}

fn read_chapters_key(manga_id: &str) -> String {
    format!("readChapters_{}", manga_id)
}

impl Progress {
    pub(crate) fn new(store: Arc<KeyValueStore>) -> Progress {
        Progress {
            store,
            mutation: Mutex::new(()),
        }
    }

    /// Loads progress of one manga; unreadable state degrades to empty
    /// progress.
    pub(crate) async fn get_progress(&self, manga_id: &str) -> ReadProgress {
        let read: BTreeSet<String> = match self.store.get(&read_chapters_key(manga_id)).await {
            Ok(Some(value)) =>
                match serde_json::from_value(value) {
                    Ok(read) => read,
                    Err(err) => {
                        suspend_error(MreadError::JsonError(err.to_string()), "progress read set");
                        BTreeSet::new()
                    }
                }
            Ok(None) => BTreeSet::new(),
            Err(err) => {
                suspend_error(err, "progress read set");
                BTreeSet::new()
            }
        };
        let last_read = match self.store.get(&last_read_key(manga_id)).await {
            Ok(Some(value)) => value.as_str().map(|chapter| chapter.to_owned()),
            Ok(None) => None,
            Err(err) => {
                suspend_error(err, "progress last read");
                None
            }
        };
        // the last-read marker is only meaningful while it is in the read set
        let last_read = last_read.filter(|chapter| read.contains(chapter));
        ReadProgress { last_read, read }
    }

    /// Adds the chapter to the read set and makes it the last-read marker;
    /// calling it again with the same arguments changes nothing.
    pub(crate) async fn mark_read(&self, manga_id: &str, chapter_id: &str) -> Result<(), MreadError> {
        let _guard = self.mutation.lock().await;
        let mut progress = self.get_progress(manga_id).await;
        progress.read.insert(chapter_id.to_owned());
        let read = match serde_json::to_value(&progress.read) {
            Ok(value) => value,
            Err(err) => {
                return Err(MreadError::JsonError(err.to_string()));
            }
        };
        // the read set is written first so the marker never points outside it
        match self.store.set(&read_chapters_key(manga_id), &read).await {
            Ok(()) => (),
            Err(err) => {
                return Err(err);
            }
        }
        self.store.set(&last_read_key(manga_id), &serde_json::json!(chapter_id)).await
    }

    pub(crate) async fn is_read(&self, manga_id: &str, chapter_id: &str) -> bool {
        self.get_progress(manga_id).await.is_read(chapter_id)
    }

    pub(crate) async fn last_read(&self, manga_id: &str) -> Option<String> {
        self.get_progress(manga_id).await.last_read
    }
}

#[cfg(test)]
fn progress_in_memory() -> Progress {
    Progress::new(Arc::new(KeyValueStore::open_in_memory().unwrap()))
}

// marking a chapter read twice keeps it in the set exactly once
#[tokio::test]
async fn test_mark_read_is_idempotent() {
    let progress = progress_in_memory();

    progress.mark_read("manga-1", "ch-1").await.unwrap();
    progress.mark_read("manga-1", "ch-1").await.unwrap();

    let state = progress.get_progress("manga-1").await;
    assert_eq!(state.read.len(), 1);
    assert_eq!(state.last_read.as_deref(), Some("ch-1"));
}

// the last-read marker follows the most recent mark
#[tokio::test]
async fn test_last_read_tracks_latest_chapter() {
    let progress = progress_in_memory();

    progress.mark_read("manga-1", "ch-1").await.unwrap();
    progress.mark_read("manga-1", "ch-2").await.unwrap();

    let state = progress.get_progress("manga-1").await;
    assert_eq!(state.last_read.as_deref(), Some("ch-2"));
    assert!(state.is_read("ch-1"));
    assert!(state.is_read("ch-2"));
}

// the read set only grows across marks
#[tokio::test]
async fn test_read_set_is_monotonic() {
    let progress = progress_in_memory();

    progress.mark_read("manga-1", "ch-1").await.unwrap();
    progress.mark_read("manga-1", "ch-2").await.unwrap();
    progress.mark_read("manga-1", "ch-3").await.unwrap();

    let state = progress.get_progress("manga-1").await;
    assert_eq!(state.read.len(), 3);
}

// progress of different manga lives under different keys
#[tokio::test]
async fn test_progress_is_namespaced_per_manga() {
    let progress = progress_in_memory();

    progress.mark_read("manga-1", "ch-1").await.unwrap();

    assert!(progress.is_read("manga-1", "ch-1").await);
    assert!(!progress.is_read("manga-2", "ch-1").await);
    assert_eq!(progress.last_read("manga-2").await, None);
}

// an unknown manga reads back as empty progress
#[tokio::test]
async fn test_unknown_manga_has_empty_progress() {
    let progress = progress_in_memory();

    let state = progress.get_progress("manga-9").await;

    assert_eq!(state, ReadProgress::default());
}

// a dangling last-read marker is dropped rather than served
#[tokio::test]
async fn test_dangling_last_read_marker_is_ignored() {
    let store = Arc::new(KeyValueStore::open_in_memory().unwrap());
    store.set("lastReadChapter_manga-1", &serde_json::json!("ch-9")).await.unwrap();

    let progress = Progress::new(store);

    assert_eq!(progress.last_read("manga-1").await, None);
}
