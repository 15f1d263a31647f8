//! File-backed offline store
//!
//! Keeps every post the client has fetched, keyed by id, plus a pointer to
//! the most recent "latest" post. The whole store is one JSON document that
//! is rewritten through a temporary file on each change.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{Blog, Genre};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    latest: Option<i64>,
    #[serde(default)]
    blogs: BTreeMap<i64, Blog>,
}

#[derive(Debug)]
pub struct OfflineStore {
    path: PathBuf,
    state: Mutex<Snapshot>,
}

impl OfflineStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Snapshot::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupt offline store at {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Snapshot::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read offline store {}", path.display()))
            }
        };
        debug!(
            "Opened offline store {} with {} posts",
            path.display(),
            snapshot.blogs.len()
        );
        Ok(Self {
            path,
            state: Mutex::new(snapshot),
        })
    }

    /// Store (or replace) a post
    pub async fn save(&self, blog: &Blog) -> Result<()> {
        let mut state = self.state.lock().await;
        state.blogs.insert(blog.id, blog.clone());
        self.persist(&state).await
    }

    /// Store several posts in one write
    pub async fn save_all(&self, blogs: &[Blog]) -> Result<()> {
        if blogs.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        for blog in blogs {
            state.blogs.insert(blog.id, blog.clone());
        }
        self.persist(&state).await
    }

    /// Store a post and point the latest pointer at it
    pub async fn save_latest(&self, blog: &Blog) -> Result<()> {
        let mut state = self.state.lock().await;
        state.blogs.insert(blog.id, blog.clone());
        state.latest = Some(blog.id);
        self.persist(&state).await
    }

    pub async fn get(&self, id: i64) -> Option<Blog> {
        self.state.lock().await.blogs.get(&id).cloned()
    }

    pub async fn latest(&self) -> Option<Blog> {
        let state = self.state.lock().await;
        state.latest.and_then(|id| state.blogs.get(&id).cloned())
    }

    /// Every stored post, newest first, optionally restricted to one genre
    pub async fn all(&self, genre: Option<Genre>) -> Vec<Blog> {
        let state = self.state.lock().await;
        let mut blogs: Vec<Blog> = state
            .blogs
            .values()
            .filter(|b| genre.map_or(true, |g| b.genre == g))
            .cloned()
            .collect();
        blogs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        blogs
    }

    /// Drop every stored post and the latest pointer
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = Snapshot::default();
        self.persist(&state).await
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot).context("Failed to encode offline store")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_blogs {
    use crate::models::{Blog, Genre};
    use chrono::{Duration, TimeZone, Utc};

    pub fn blog(id: i64, genre: Genre) -> Blog {
        Blog {
            id,
            title: format!("Post {}", id),
            body: format!("<p>Body {}</p>", id),
            image: "https://img.example/cover.jpg".to_string(),
            image_alt: format!("Blog post image about Post {}", id),
            image_caption: String::new(),
            genre,
            links: vec![],
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::hours(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_blogs::blog;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = OfflineStore::open(dir.path().join("offline.json")).await.unwrap();
        assert!(store.latest().await.is_none());
        assert!(store.all(None).await.is_empty());
        assert!(store.get(1).await.is_none());
    }

    #[tokio::test]
    async fn test_save_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("offline.json");

        let store = OfflineStore::open(&path).await.unwrap();
        tokio_test::assert_ok!(store.save(&blog(1, Genre::Coding)).await);
        tokio_test::assert_ok!(store.save_latest(&blog(2, Genre::AiMl)).await);

        let reopened = OfflineStore::open(&path).await.unwrap();
        assert_eq!(reopened.latest().await.unwrap().id, 2);
        assert_eq!(reopened.get(1).await.unwrap().title, "Post 1");
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_all_is_newest_first_and_filters_genre() {
        let dir = TempDir::new().unwrap();
        let store = OfflineStore::open(dir.path().join("offline.json")).await.unwrap();
        store
            .save_all(&[blog(1, Genre::Coding), blog(3, Genre::AiMl), blog(2, Genre::Coding)])
            .await
            .unwrap();

        let ids: Vec<i64> = store.all(None).await.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let coding: Vec<i64> = store.all(Some(Genre::Coding)).await.iter().map(|b| b.id).collect();
        assert_eq!(coding, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("offline.json");
        let store = OfflineStore::open(&path).await.unwrap();
        store.save_latest(&blog(5, Genre::General)).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.latest().await.is_none());
        assert!(OfflineStore::open(&path).await.unwrap().all(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("offline.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = OfflineStore::open(&path).await.unwrap_err();
        assert!(err.to_string().contains("Corrupt offline store"));
    }
}
