use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs;
use tracing::debug;

use super::{Adapter, AdapterStorage, Catalog, Movie, MovieStorage};
use crate::error::StorageError;

/// Catalog kept in a single JSON file, rewritten after every change.
///
/// ```json
/// {
///   "movies": { "42": { "id": 42, "name": "...", "paths": "a.torrent;b.torrent", "file_version": 0 } },
///   "adapters": []
/// }
/// ```
#[derive(Debug)]
pub struct JsonStorage {
    path: PathBuf,
    catalog: Mutex<Catalog>,
    /// Held across a snapshot and its write so the file never goes back
    /// to an older catalog.
    writer: tokio::sync::Mutex<()>,
}

impl JsonStorage {
    /// Loads the catalog at `path`. A missing file is an empty catalog.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let catalog = match fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(internal)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Catalog::default(),
            Err(e) => return Err(internal(e)),
        };

        Ok(JsonStorage {
            path,
            catalog: Mutex::new(catalog),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub async fn insert_movie(&self, movie: Movie) -> Result<(), StorageError> {
        self.catalog.lock().insert_movie(movie);
        self.persist().await
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let _writer = self.writer.lock().await;
        let raw = serde_json::to_vec_pretty(&*self.catalog.lock()).map_err(internal)?;
        fs::write(&self.path, raw).await.map_err(internal)?;
        debug!(path = %self.path.display(), "catalog written");
        Ok(())
    }
}

fn internal(err: impl ToString) -> StorageError {
    StorageError::Internal(err.to_string())
}

#[async_trait]
impl MovieStorage for JsonStorage {
    async fn get_movie_by_id(&self, id: u64) -> Result<Movie, StorageError> {
        self.catalog.lock().get_movie(id)
    }

    async fn update_movie(&self, movie: &Movie) -> Result<(), StorageError> {
        self.catalog.lock().update_movie(movie)?;
        self.persist().await
    }
}

#[async_trait]
impl AdapterStorage for JsonStorage {
    async fn get_adapter(&self, movie_id: u64, version: u32) -> Result<Adapter, StorageError> {
        self.catalog.lock().get_adapter(movie_id, version)
    }

    async fn create_adapter(&self, adapter: Adapter) -> Result<Adapter, StorageError> {
        let (stored, created) = {
            let mut catalog = self.catalog.lock();
            let count = catalog.adapters.len();
            let stored = catalog.create_adapter(adapter);
            (stored, catalog.adapters.len() != count)
        };
        if created {
            self.persist().await?;
        }
        Ok(stored)
    }
}
