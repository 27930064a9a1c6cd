use parking_lot::Mutex;
use std::sync::Arc;

use crate::{
    db::KeyValueStore,
    error::{ suspend_error, MreadError },
    metadata::{ Colors, ContentRating, Preferences, PreferencesUpdate },
};

pub(crate) const THEME_KEY: &str = "theme";
pub(crate) const COLORS_KEY: &str = "colors";
pub(crate) const ADULT_CONTENT_KEY: &str = "adultContentEnabled";
pub(crate) const LANGUAGES_KEY: &str = "selectedLanguages";

pub(crate) type Subscriber = Box<dyn Fn(&Preferences) + Send + Sync>;

/// Preferences service. Constructed once at startup with whatever the store
/// holds, mutated through `update`, and handed by reference to every
/// component that needs it; there is no ambient global instance.
pub(crate) struct Settings {
    store: Arc<KeyValueStore>,
    current: Mutex<Preferences>,
    subscribers: Mutex<Vec<Subscriber>>,
    mutation: tokio::sync::Mutex<()>,
}

fn dedup_languages(languages: Vec<String>) -> Vec<String> {
    let mut seen = Vec::new();
    for language in languages {
        if !seen.contains(&language) {
            seen.push(language);
        }
    }
    seen
}

impl Settings {
    /// Loads preferences field by field; any absent or corrupt field falls
    /// back to its default without failing the rest of the load.
    pub(crate) async fn load(store: Arc<KeyValueStore>) -> Settings {
        let defaults = Preferences::default();
        let theme = match store.get(THEME_KEY).await {
            Ok(Some(value)) =>
                value
                    .as_str()
                    .map(|theme| theme.to_owned())
                    .unwrap_or(defaults.theme),
            Ok(None) => defaults.theme,
            Err(err) => {
                suspend_error(err, "settings load theme");
                defaults.theme
            }
        };
        let colors = match store.get(COLORS_KEY).await {
            Ok(Some(value)) =>
                serde_json::from_value::<Colors>(value).unwrap_or(defaults.colors),
            Ok(None) => defaults.colors,
            Err(err) => {
                suspend_error(err, "settings load colors");
                defaults.colors
            }
        };
        let adult_content_enabled = match store.get(ADULT_CONTENT_KEY).await {
            Ok(Some(value)) => value.as_bool().unwrap_or(defaults.adult_content_enabled),
            Ok(None) => defaults.adult_content_enabled,
            Err(err) => {
                suspend_error(err, "settings load adult content");
                defaults.adult_content_enabled
            }
        };
        let selected_languages = match store.get(LANGUAGES_KEY).await {
            Ok(Some(value)) =>
                serde_json::from_value::<Vec<String>>(value)
                    .map(dedup_languages)
                    .unwrap_or(defaults.selected_languages),
            Ok(None) => defaults.selected_languages,
            Err(err) => {
                suspend_error(err, "settings load languages");
                defaults.selected_languages
            }
        };
        Settings {
            store,
            current: Mutex::new(Preferences {
                theme,
                colors,
                adult_content_enabled,
                selected_languages,
            }),
            subscribers: Mutex::new(Vec::new()),
            mutation: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn current(&self) -> Preferences {
        self.current.lock().clone()
    }

    pub(crate) fn content_ratings(&self) -> Vec<ContentRating> {
        self.current().content_ratings()
    }

    pub(crate) fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers.lock().push(subscriber);
    }

    /// Merges a partial change, persists the whole record and then notifies
    /// current subscribers with the new snapshot. Updates apply in call
    /// order; a persist failure is returned and skips the notification.
    pub(crate) async fn update(
        &self,
        change: PreferencesUpdate
    ) -> Result<Preferences, MreadError> {
        let _guard = self.mutation.lock().await;
        let next = {
            let mut current = self.current.lock();
            if let Some(theme) = change.theme {
                current.theme = theme;
            }
            if let Some(colors) = change.colors {
                current.colors = colors;
            }
            if let Some(adult_content_enabled) = change.adult_content_enabled {
                current.adult_content_enabled = adult_content_enabled;
            }
            if let Some(selected_languages) = change.selected_languages {
                current.selected_languages = dedup_languages(selected_languages);
            }
            current.clone()
        };
        match self.persist(&next).await {
            Ok(()) => (),
            Err(err) => {
                return Err(err);
            }
        }
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.iter() {
            subscriber(&next);
        }
        Ok(next)
    }

    async fn persist(&self, preferences: &Preferences) -> Result<(), MreadError> {
        match self.store.set(THEME_KEY, &serde_json::json!(preferences.theme)).await {
            Ok(()) => (),
            Err(err) => {
                return Err(err);
            }
        }
        let colors = match serde_json::to_value(&preferences.colors) {
            Ok(value) => value,
            Err(err) => {
                return Err(MreadError::JsonError(err.to_string()));
            }
        };
        match self.store.set(COLORS_KEY, &colors).await {
            Ok(()) => (),
            Err(err) => {
                return Err(err);
            }
        }
        match
            self.store.set(
                ADULT_CONTENT_KEY,
                &serde_json::json!(preferences.adult_content_enabled)
            ).await
        {
            Ok(()) => (),
            Err(err) => {
                return Err(err);
            }
        }
        self.store.set(LANGUAGES_KEY, &serde_json::json!(preferences.selected_languages)).await
    }
}

#[cfg(test)]
async fn settings_in_memory() -> (Arc<KeyValueStore>, Settings) {
    let store = Arc::new(KeyValueStore::open_in_memory().unwrap());
    let settings = Settings::load(store.clone()).await;
    (store, settings)
}

// first run serves the built-in defaults
#[tokio::test]
async fn test_load_on_empty_store_uses_defaults() {
    let (_store, settings) = settings_in_memory().await;

    assert_eq!(settings.current(), Preferences::default());
}

// an update touches only the targeted field
#[tokio::test]
async fn test_update_changes_only_named_field() {
    let (_store, settings) = settings_in_memory().await;

    let updated = settings.update(PreferencesUpdate {
        adult_content_enabled: Some(true),
        ..PreferencesUpdate::default()
    }).await.unwrap();

    assert!(updated.adult_content_enabled);
    assert_eq!(updated.theme, Preferences::default().theme);
    assert_eq!(updated.colors, Preferences::default().colors);
    assert_eq!(updated.selected_languages, Preferences::default().selected_languages);
}

// a reload over the same store returns the merged preferences
#[tokio::test]
async fn test_update_survives_reload() {
    let (store, settings) = settings_in_memory().await;
    settings.update(PreferencesUpdate {
        theme: Some(String::from("dark")),
        adult_content_enabled: Some(true),
        ..PreferencesUpdate::default()
    }).await.unwrap();

    let reloaded = Settings::load(store).await;

    let current = reloaded.current();
    assert_eq!(current.theme, "dark");
    assert!(current.adult_content_enabled);
    assert_eq!(current.selected_languages, Preferences::default().selected_languages);
}

// one corrupt field falls back alone, the rest of the record loads
#[tokio::test]
async fn test_corrupt_field_does_not_poison_load() {
    let store = Arc::new(KeyValueStore::open_in_memory().unwrap());
    store.set(THEME_KEY, &serde_json::json!("dark")).await.unwrap();
    store.set(COLORS_KEY, &serde_json::json!(42)).await.unwrap();

    let settings = Settings::load(store).await;

    let current = settings.current();
    assert_eq!(current.theme, "dark");
    assert_eq!(current.colors, Colors::default());
}

// subscribers see the snapshot of every successful update
#[tokio::test]
async fn test_subscribers_receive_new_snapshot() {
    let (_store, settings) = settings_in_memory().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    settings.subscribe(
        Box::new(move |preferences| {
            sink.lock().push(preferences.theme.clone());
        })
    );

    settings.update(PreferencesUpdate {
        theme: Some(String::from("dark")),
        ..PreferencesUpdate::default()
    }).await.unwrap();

    assert_eq!(*seen.lock(), vec![String::from("dark")]);
}

// selected languages keep their order but never repeat
#[tokio::test]
async fn test_selected_languages_are_deduplicated() {
    let (_store, settings) = settings_in_memory().await;

    let updated = settings.update(PreferencesUpdate {
        selected_languages: Some(
            vec![String::from("en"), String::from("pl"), String::from("en")]
        ),
        ..PreferencesUpdate::default()
    }).await.unwrap();

    assert_eq!(updated.selected_languages, vec![String::from("en"), String::from("pl")]);
}

// the persisted keys match what the store format promises
#[tokio::test]
async fn test_persisted_keys_and_shapes() {
    let (store, settings) = settings_in_memory().await;

    settings.update(PreferencesUpdate {
        theme: Some(String::from("dark")),
        ..PreferencesUpdate::default()
    }).await.unwrap();

    assert_eq!(store.get(THEME_KEY).await.unwrap(), Some(serde_json::json!("dark")));
    assert_eq!(
        store.get(ADULT_CONTENT_KEY).await.unwrap(),
        Some(serde_json::json!(false))
    );
    assert_eq!(
        store.get(LANGUAGES_KEY).await.unwrap(),
        Some(serde_json::json!(["en"]))
    );
    assert!(store.get(COLORS_KEY).await.unwrap().is_some());
}
