//! Catalog records the streamer reads and writes, and the narrow traits it
//! needs from whatever stores them.

mod json;
mod memory;

pub use json::JsonStorage;
pub use memory::MemoryStorage;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: u64,
    pub name: String,
    /// Candidate descriptor paths joined with `;`, tried left to right.
    pub paths: String,
    pub file_version: u32,
}

impl Movie {
    pub fn path_list(&self) -> Vec<String> {
        self.paths
            .split(';')
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Geometry of one file version of a movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adapter {
    pub id: u64,
    pub movie_id: u64,
    pub version: u32,
    pub length: u64,
    pub piece_length: u64,
}

#[async_trait]
pub trait MovieStorage: Send + Sync {
    async fn get_movie_by_id(&self, id: u64) -> Result<Movie, StorageError>;

    /// Replaces the stored movie. Any cached copy must not outlive this call.
    async fn update_movie(&self, movie: &Movie) -> Result<(), StorageError>;
}

#[async_trait]
pub trait AdapterStorage: Send + Sync {
    async fn get_adapter(&self, movie_id: u64, version: u32) -> Result<Adapter, StorageError>;

    /// Stores a new record and returns it with its id. If one already exists
    /// for the same movie and version, that one is returned untouched.
    async fn create_adapter(&self, adapter: Adapter) -> Result<Adapter, StorageError>;
}

/// In-memory form shared by the storage implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Catalog {
    #[serde(default)]
    movies: BTreeMap<u64, Movie>,
    #[serde(default)]
    adapters: Vec<Adapter>,
}

impl Catalog {
    fn get_movie(&self, id: u64) -> Result<Movie, StorageError> {
        self.movies.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    fn insert_movie(&mut self, movie: Movie) {
        self.movies.insert(movie.id, movie);
    }

    fn update_movie(&mut self, movie: &Movie) -> Result<(), StorageError> {
        let stored = self
            .movies
            .get_mut(&movie.id)
            .ok_or(StorageError::NotFound)?;
        *stored = movie.clone();
        Ok(())
    }

    fn get_adapter(&self, movie_id: u64, version: u32) -> Result<Adapter, StorageError> {
        self.adapters
            .iter()
            .find(|adapter| adapter.movie_id == movie_id && adapter.version == version)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn create_adapter(&mut self, adapter: Adapter) -> Adapter {
        if let Ok(existing) = self.get_adapter(adapter.movie_id, adapter.version) {
            return existing;
        }

        let id = self.adapters.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        let adapter = Adapter { id, ..adapter };
        self.adapters.push(adapter.clone());
        adapter
    }
}
