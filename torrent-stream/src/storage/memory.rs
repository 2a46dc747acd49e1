use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Adapter, AdapterStorage, Catalog, Movie, MovieStorage};
use crate::error::StorageError;

/// Catalog held in process memory only.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    catalog: Mutex<Catalog>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_movies(movies: impl IntoIterator<Item = Movie>) -> Self {
        let storage = Self::new();
        for movie in movies {
            storage.insert_movie(movie);
        }
        storage
    }

    pub fn insert_movie(&self, movie: Movie) {
        self.catalog.lock().insert_movie(movie);
    }

    pub fn adapters(&self) -> Vec<Adapter> {
        self.catalog.lock().adapters.clone()
    }
}

#[async_trait]
impl MovieStorage for MemoryStorage {
    async fn get_movie_by_id(&self, id: u64) -> Result<Movie, StorageError> {
        self.catalog.lock().get_movie(id)
    }

    async fn update_movie(&self, movie: &Movie) -> Result<(), StorageError> {
        self.catalog.lock().update_movie(movie)
    }
}

#[async_trait]
impl AdapterStorage for MemoryStorage {
    async fn get_adapter(&self, movie_id: u64, version: u32) -> Result<Adapter, StorageError> {
        self.catalog.lock().get_adapter(movie_id, version)
    }

    async fn create_adapter(&self, adapter: Adapter) -> Result<Adapter, StorageError> {
        Ok(self.catalog.lock().create_adapter(adapter))
    }
}
