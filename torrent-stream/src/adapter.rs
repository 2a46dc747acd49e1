//! Chunk index translation between file versions of a movie.
//!
//! Clients keep asking for chunks numbered under the file version they
//! started watching, even after the catalog has moved on to another
//! descriptor. The index is mapped through each version's piece length to
//! total length ratio. This is approximate: the pieces of two encodings only
//! line up if they describe the same bytes.

use torrent_parser::model::TorrentDescriptor;
use tracing::debug;

use crate::{
    error::StorageError,
    storage::{Adapter, AdapterStorage},
};

pub struct ChunkIndexAdapter<'a> {
    storage: &'a dyn AdapterStorage,
}

impl<'a> ChunkIndexAdapter<'a> {
    pub fn new(storage: &'a dyn AdapterStorage) -> Self {
        ChunkIndexAdapter { storage }
    }

    /// Returns the geometry record of `version`, recording the geometry of
    /// `descriptor` for it first if there is none yet.
    pub async fn ensure(
        &self,
        movie_id: u64,
        version: u32,
        descriptor: &TorrentDescriptor,
    ) -> Result<Adapter, StorageError> {
        match self.storage.get_adapter(movie_id, version).await {
            Ok(adapter) => Ok(adapter),
            Err(StorageError::NotFound) => {
                debug!(movie_id, version, "recording file geometry");
                self.storage
                    .create_adapter(Adapter {
                        id: 0,
                        movie_id,
                        version,
                        length: descriptor.length,
                        piece_length: descriptor.piece_length,
                    })
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Maps `index`, numbered under `requested_version`, onto the descriptor
    /// currently open under `current_version`.
    pub async fn translate(
        &self,
        movie_id: u64,
        index: usize,
        requested_version: u32,
        current_version: u32,
        current: &TorrentDescriptor,
    ) -> Result<usize, StorageError> {
        if requested_version == current_version {
            return Ok(index);
        }

        let requested = self.storage.get_adapter(movie_id, requested_version).await?;
        let current = self.ensure(movie_id, current_version, current).await?;
        let translated = translate_index(index, &requested, &current);
        debug!(
            movie_id,
            index, requested_version, current_version, translated, "translated chunk index"
        );
        Ok(translated)
    }
}

/// `floor((pl_req / len_req) * index * 100 / ((pl_cur / len_cur) * 100))`
pub fn translate_index(index: usize, requested: &Adapter, current: &Adapter) -> usize {
    let requested_ratio = requested.piece_length as f64 / requested.length as f64;
    let current_ratio = current.piece_length as f64 / current.length as f64;

    (requested_ratio * index as f64 * 100.0 / (current_ratio * 100.0)).floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn geometry(version: u32, piece_length: u64, length: u64) -> Adapter {
        Adapter {
            id: 0,
            movie_id: 42,
            version,
            length,
            piece_length,
        }
    }

    fn descriptor(piece_length: u64, length: u64) -> TorrentDescriptor {
        TorrentDescriptor {
            announce: "http://tracker/announce".to_string(),
            announce_list: None,
            comment: None,
            created_by: None,
            creation_date: None,
            name: "movie.mp4".to_string(),
            piece_length,
            pieces: vec![[0; 20]; length.div_ceil(piece_length) as usize],
            private: None,
            files: None,
            length,
            info_hash: [0; 20],
        }
    }

    #[test]
    fn same_ratio_keeps_index() {
        let requested = geometry(0, 16_384, 1_048_576);
        let current = geometry(1, 32_768, 2_097_152);
        assert_eq!(translate_index(10, &requested, &current), 10);
    }

    #[test]
    fn larger_pieces_halve_index() {
        let requested = geometry(0, 16_384, 1_048_576);
        let current = geometry(1, 65_536, 2_097_152);
        assert_eq!(translate_index(10, &requested, &current), 5);
        assert_eq!(translate_index(11, &requested, &current), 5);
    }

    #[test]
    fn translation_is_monotonic() {
        let requested = geometry(0, 16_384, 1_000_003);
        let current = geometry(1, 262_144, 7_340_033);

        let translated: Vec<_> = (0..500)
            .map(|index| translate_index(index, &requested, &current))
            .collect();
        assert!(translated.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn same_version_is_identity() {
        let storage = MemoryStorage::new();
        let adapter = ChunkIndexAdapter::new(&storage);

        // no records needed, and odd geometry is never consulted
        for index in [0, 1, 7, 1_000_000] {
            let translated = adapter
                .translate(42, index, 3, 3, &descriptor(3, 10))
                .await
                .unwrap();
            assert_eq!(translated, index);
        }
        assert!(storage.adapters().is_empty());
    }

    #[tokio::test]
    async fn translate_loads_both_records() {
        let storage = MemoryStorage::new();
        storage.create_adapter(geometry(0, 16_384, 1_048_576)).await.unwrap();
        let adapter = ChunkIndexAdapter::new(&storage);

        let translated = adapter
            .translate(42, 10, 0, 1, &descriptor(65_536, 2_097_152))
            .await
            .unwrap();

        assert_eq!(translated, 5);
        assert_eq!(storage.get_adapter(42, 1).await.unwrap().piece_length, 65_536);
    }

    #[tokio::test]
    async fn unknown_requested_version() {
        let storage = MemoryStorage::new();
        let adapter = ChunkIndexAdapter::new(&storage);

        assert_eq!(
            adapter
                .translate(42, 10, 5, 1, &descriptor(65_536, 2_097_152))
                .await,
            Err(StorageError::NotFound)
        );
    }

    #[tokio::test]
    async fn ensure_does_not_overwrite() {
        let storage = MemoryStorage::new();
        let adapter = ChunkIndexAdapter::new(&storage);

        let first = adapter.ensure(42, 0, &descriptor(16_384, 1_048_576)).await.unwrap();
        let second = adapter.ensure(42, 0, &descriptor(65_536, 2_097_152)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.adapters().len(), 1);
    }
}
