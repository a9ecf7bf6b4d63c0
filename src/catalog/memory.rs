//! Catalog held in memory, optionally persisted as a JSON snapshot file.

use super::layout::MediaLayout;
use super::models::{Media, MediaServer, Source};
use super::store::{CatalogStore, IndexBatch, MediaFilter};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogState {
    sources: HashMap<Uuid, Source>,
    media: HashMap<Uuid, Media>,
    media_servers: HashMap<Uuid, MediaServer>,
}

pub struct MemoryCatalogStore {
    state: Mutex<CatalogState>,
    layout: MediaLayout,
    snapshot_path: Option<PathBuf>,
}

impl MemoryCatalogStore {
    /// Creates an empty catalog that lives only in memory.
    pub fn new(layout: MediaLayout) -> Self {
        Self {
            state: Mutex::new(CatalogState::default()),
            layout,
            snapshot_path: None,
        }
    }

    /// Opens a catalog backed by `snapshot_path`, loading it when it exists.
    pub fn open<P: AsRef<Path>>(snapshot_path: P, layout: MediaLayout) -> Result<Self> {
        let snapshot_path = snapshot_path.as_ref().to_path_buf();
        let state = if snapshot_path.exists() {
            let content = std::fs::read_to_string(&snapshot_path)
                .with_context(|| format!("Failed to read catalog snapshot {:?}", snapshot_path))?;
            let state: CatalogState = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse catalog snapshot {:?}", snapshot_path))?;
            info!(
                "Loaded catalog with {} sources and {} media from {:?}",
                state.sources.len(),
                state.media.len(),
                snapshot_path
            );
            state
        } else {
            info!("Starting empty catalog at {:?}", snapshot_path);
            CatalogState::default()
        };

        Ok(Self {
            state: Mutex::new(state),
            layout,
            snapshot_path: Some(snapshot_path),
        })
    }

    pub fn layout(&self) -> &MediaLayout {
        &self.layout
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Catalog state lock poisoned"))
    }

    /// Applies `change` and persists the result. A failed change or a failed
    /// snapshot write leaves the catalog as it was.
    fn mutate<T>(&self, change: impl FnOnce(&mut CatalogState) -> Result<T>) -> Result<T> {
        let mut state = self.lock()?;
        let backup = self.snapshot_path.as_ref().map(|_| state.clone());

        let result = match change(&mut state) {
            Ok(result) => result,
            Err(e) => {
                if let Some(backup) = backup {
                    *state = backup;
                }
                return Err(e);
            }
        };

        if let Err(e) = self.persist(&state) {
            if let Some(backup) = backup {
                *state = backup;
            }
            return Err(e);
        }
        Ok(result)
    }

    fn persist(&self, state: &CatalogState) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary snapshot in {:?}", dir))?;
        serde_json::to_writer(&mut file, state).context("Failed to serialize catalog")?;
        file.flush()?;
        file.persist(path)
            .with_context(|| format!("Failed to write catalog snapshot {:?}", path))?;
        Ok(())
    }

    fn remove_files(&self, source: Option<&Source>, media: &Media) {
        let files = match source {
            Some(source) => self.layout.owned_files(source, media),
            None => [&media.media_file, &media.thumbnail]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
        };
        for path in files {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {:?}: {}", path, e),
            }
        }
    }
}

fn sorted_media(mut media: Vec<Media>) -> Vec<Media> {
    media.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
    media
}

impl CatalogStore for MemoryCatalogStore {
    fn get_source(&self, id: &Uuid) -> Result<Option<Source>> {
        Ok(self.lock()?.sources.get(id).cloned())
    }

    fn list_sources(&self) -> Result<Vec<Source>> {
        let mut sources: Vec<Source> = self.lock()?.sources.values().cloned().collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(sources)
    }

    fn save_source(&self, source: &Source) -> Result<()> {
        self.mutate(|state| {
            state.sources.insert(source.id, source.clone());
            Ok(())
        })
    }

    fn delete_source(&self, id: &Uuid) -> Result<Option<Source>> {
        let (source, media) = self.mutate(|state| {
            let Some(source) = state.sources.remove(id) else {
                return Ok((None, Vec::new()));
            };
            let media_ids: Vec<Uuid> = state
                .media
                .values()
                .filter(|m| m.source_id == *id)
                .map(|m| m.id)
                .collect();
            let media = media_ids
                .iter()
                .filter_map(|media_id| state.media.remove(media_id))
                .collect::<Vec<_>>();
            Ok((Some(source), media))
        })?;

        if let Some(source) = &source {
            for media in &media {
                self.remove_files(Some(source), media);
            }
            info!(
                "Deleted source {} ({}) with {} media items",
                source.name,
                source.id,
                media.len()
            );
        }
        Ok(source)
    }

    fn get_media(&self, id: &Uuid) -> Result<Option<Media>> {
        Ok(self.lock()?.media.get(id).cloned())
    }

    fn find_media_by_key(&self, source_id: &Uuid, key: &str) -> Result<Option<Media>> {
        Ok(self
            .lock()?
            .media
            .values()
            .find(|m| m.source_id == *source_id && m.key == key)
            .cloned())
    }

    fn list_media(&self, filter: &MediaFilter) -> Result<Vec<Media>> {
        let media = self
            .lock()?
            .media
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        Ok(sorted_media(media))
    }

    fn save_media(&self, media: &Media) -> Result<()> {
        self.mutate(|state| {
            if !state.sources.contains_key(&media.source_id) {
                bail!("Media {} references unknown source {}", media.id, media.source_id);
            }
            let duplicate = state.media.values().any(|m| {
                m.id != media.id && m.source_id == media.source_id && m.key == media.key
            });
            if duplicate {
                bail!(
                    "Media key {} already exists in source {}",
                    media.key,
                    media.source_id
                );
            }
            state.media.insert(media.id, media.clone());
            Ok(())
        })
    }

    fn delete_media(&self, id: &Uuid) -> Result<Option<Media>> {
        let removed = self.mutate(|state| {
            let media = state.media.remove(id);
            let source = media
                .as_ref()
                .and_then(|m| state.sources.get(&m.source_id).cloned());
            Ok(media.map(|m| (m, source)))
        })?;

        Ok(removed.map(|(media, source)| {
            self.remove_files(source.as_ref(), &media);
            media
        }))
    }

    fn index_media_keys(&self, source_id: &Uuid, keys: &[String]) -> Result<IndexBatch> {
        self.mutate(|state| {
            if !state.sources.contains_key(source_id) {
                bail!("Cannot index unknown source {}", source_id);
            }

            let mut known: HashMap<&str, &Media> = HashMap::new();
            for media in state.media.values().filter(|m| m.source_id == *source_id) {
                known.insert(media.key.as_str(), media);
            }

            let mut batch = IndexBatch::default();
            let mut seen: HashSet<&str> = HashSet::new();
            for key in keys {
                if !seen.insert(key.as_str()) {
                    batch.collisions.push(key.clone());
                    continue;
                }
                match known.get(key.as_str()) {
                    Some(existing) => batch.existing.push((*existing).clone()),
                    None => batch.created.push(Media::new(*source_id, key.clone())),
                }
            }

            for media in &batch.created {
                state.media.insert(media.id, media.clone());
            }
            Ok(batch)
        })
    }

    fn list_media_servers(&self) -> Result<Vec<MediaServer>> {
        let mut servers: Vec<MediaServer> =
            self.lock()?.media_servers.values().cloned().collect();
        servers.sort_by(|a, b| a.host.cmp(&b.host).then_with(|| a.id.cmp(&b.id)));
        Ok(servers)
    }

    fn get_media_server(&self, id: &Uuid) -> Result<Option<MediaServer>> {
        Ok(self.lock()?.media_servers.get(id).cloned())
    }

    fn save_media_server(&self, server: &MediaServer) -> Result<()> {
        self.mutate(|state| {
            state.media_servers.insert(server.id, server.clone());
            Ok(())
        })
    }
}
