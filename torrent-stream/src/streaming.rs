use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use torrent_parser::{
    error::TorrentParserError,
    model::{TorrentDescriptor, TorrentMetadata},
    parse_descriptor,
};
use torrent_pwp::{error::FetchError, Piece, PieceFetcher};
use tracing::{debug, info, instrument, warn};

use crate::{
    adapter::ChunkIndexAdapter,
    config::StreamConfig,
    error::{StreamError, StreamResult},
    session::{Session, State},
    storage::{AdapterStorage, Movie, MovieStorage},
    tracker::Announce,
};

/// Where piece bytes come from.
#[async_trait]
pub trait PieceSource: Send + Sync {
    async fn fetch(&self, metadata: &TorrentMetadata, index: usize) -> Result<Piece, FetchError>;
}

#[async_trait]
impl PieceSource for PieceFetcher {
    async fn fetch(&self, metadata: &TorrentMetadata, index: usize) -> Result<Piece, FetchError> {
        PieceFetcher::fetch(self, metadata, index).await
    }
}

/// One chunk of a movie as handed to a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub buffer: Vec<u8>,
    pub next_index: usize,
    pub file_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub movie_id: u64,
    pub file_version: u32,
    pub index: usize,
}

impl ChunkRequest {
    /// Builds a request from raw path or query values.
    pub fn parse(movie_id: &str, file_version: &str, index: &str) -> StreamResult<Self> {
        Ok(ChunkRequest {
            movie_id: parse_field("movie id", movie_id)?,
            file_version: parse_field("file version", file_version)?,
            index: parse_field("chunk index", index)?,
        })
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, raw: &str) -> StreamResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| StreamError::BadInput(format!("{name} must be a non-negative integer, got {raw:?}")))
}

/// Serves movie chunks straight from the swarm. Only torrent metadata is
/// kept between requests; piece bytes are downloaded again every time.
pub struct Streamer {
    movies: Arc<dyn MovieStorage>,
    adapters: Arc<dyn AdapterStorage>,
    state: Arc<dyn State>,
    tracker: Arc<dyn Announce>,
    pieces: Arc<dyn PieceSource>,
    files_root: PathBuf,
    session_ttl: Duration,
}

impl Streamer {
    pub fn new(
        movies: Arc<dyn MovieStorage>,
        adapters: Arc<dyn AdapterStorage>,
        state: Arc<dyn State>,
        tracker: Arc<dyn Announce>,
        pieces: Arc<dyn PieceSource>,
        config: &StreamConfig,
    ) -> Self {
        Streamer {
            movies,
            adapters,
            state,
            tracker,
            pieces,
            files_root: config.files_root.clone(),
            session_ttl: config.session_ttl(),
        }
    }

    /// First chunk of a movie.
    #[instrument(skip(self))]
    pub async fn start_watch(&self, movie_id: u64) -> StreamResult<Chunk> {
        let movie = self.movies.get_movie_by_id(movie_id).await?;
        let session = self.session(movie).await?;
        self.chunk(movie_id, &session, 0).await
    }

    /// Chunk `request.index` as numbered under `request.file_version`.
    #[instrument(skip(self))]
    pub async fn get_chunk(&self, request: ChunkRequest) -> StreamResult<Chunk> {
        let ChunkRequest {
            movie_id,
            file_version,
            index,
        } = request;

        let movie = self.movies.get_movie_by_id(movie_id).await?;
        let session = self.session(movie).await?;

        let index = ChunkIndexAdapter::new(self.adapters.as_ref())
            .translate(
                movie_id,
                index,
                file_version,
                session.file_version,
                &session.metadata.descriptor,
            )
            .await
            .map_err(|e| {
                warn!(movie_id, file_version, "cannot translate chunk index: {e}");
                StreamError::from(e)
            })?;

        self.chunk(movie_id, &session, index).await
    }

    async fn chunk(&self, movie_id: u64, session: &Session, index: usize) -> StreamResult<Chunk> {
        let count = session.metadata.descriptor.piece_count();
        if index >= count {
            return Err(StreamError::BadInput(format!(
                "chunk index {index} must be in range [0..{count})"
            )));
        }

        let piece = self
            .pieces
            .fetch(&session.metadata, index)
            .await
            .map_err(|e| {
                warn!(movie_id, index, "cannot fetch chunk: {e}");
                match e {
                    FetchError::IndexOutOfRange { .. } => StreamError::BadInput(e.to_string()),
                    FetchError::NoPeerHasPiece(_) => {
                        // the peer list is spent, announce again next time
                        self.state.remove(movie_id);
                        StreamError::Internal
                    }
                    FetchError::PieceTooLarge { .. } => StreamError::Internal,
                }
            })?;
        self.state.touch(movie_id, self.session_ttl);

        Ok(Chunk {
            buffer: piece.buf,
            next_index: index + 1,
            file_version: session.file_version,
        })
    }

    /// The cached session of `movie`, opening it on a miss.
    async fn session(&self, movie: Movie) -> StreamResult<Arc<Session>> {
        if let Some(session) = self.state.get(movie.id) {
            return Ok(session);
        }

        let movie_id = movie.id;
        let session = Arc::new(self.open(movie).await?);
        self.state
            .put(movie_id, Arc::clone(&session), self.session_ttl);
        Ok(session)
    }

    /// Walks the movie's descriptor paths until one decodes and announces.
    /// Paths that fail are deleted; if the working one was not first, the
    /// catalog is rewritten without the dead paths under a new file version.
    async fn open(&self, mut movie: Movie) -> StreamResult<Session> {
        let paths = movie.path_list();

        for (position, path) in paths.iter().enumerate() {
            let full_path = self.files_root.join(path);

            let descriptor = match read_descriptor(&full_path).await {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(movie_id = movie.id, path = %full_path.display(), "unusable descriptor: {e}");
                    discard(&full_path).await;
                    continue;
                }
            };

            let metadata = match self.tracker.announce(descriptor).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(movie_id = movie.id, path = %full_path.display(), "announce failed: {e}");
                    discard(&full_path).await;
                    continue;
                }
            };

            if position > 0 {
                movie.paths = paths[position..].join(";");
                movie.file_version += 1;
                info!(
                    movie_id = movie.id,
                    file_version = movie.file_version,
                    "dropped {position} stale descriptor path(s)"
                );
                self.movies.update_movie(&movie).await.map_err(|e| {
                    warn!(movie_id = movie.id, "cannot update movie: {e}");
                    StreamError::Internal
                })?;
            }

            ChunkIndexAdapter::new(self.adapters.as_ref())
                .ensure(movie.id, movie.file_version, &metadata.descriptor)
                .await
                .map_err(|e| {
                    warn!(movie_id = movie.id, "cannot record file geometry: {e}");
                    StreamError::Internal
                })?;

            info!(
                movie_id = movie.id,
                file_version = movie.file_version,
                info_hash = %hex::encode(metadata.descriptor.info_hash),
                peers = metadata.peers.len(),
                "opened session"
            );
            return Ok(Session {
                metadata,
                file_version: movie.file_version,
            });
        }

        warn!(movie_id = movie.id, "no usable descriptor left");
        Err(StreamError::Internal)
    }
}

async fn read_descriptor(path: &Path) -> Result<TorrentDescriptor, TorrentParserError> {
    let bencoded = tokio::fs::read(path).await?;
    parse_descriptor(&bencoded)
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed descriptor"),
        Err(e) => debug!(path = %path.display(), "cannot remove descriptor: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request() {
        assert_eq!(
            ChunkRequest::parse("42", "1", "5").unwrap(),
            ChunkRequest {
                movie_id: 42,
                file_version: 1,
                index: 5,
            }
        );
    }

    #[test]
    fn rejects_malformed_request() {
        for (id, version, index) in [("abc", "0", "1"), ("42", "-1", "1"), ("42", "0", "1.5"), ("", "0", "0")] {
            assert!(matches!(
                ChunkRequest::parse(id, version, index),
                Err(StreamError::BadInput(_))
            ));
        }
    }

    #[test]
    fn chunk_serializes() {
        let chunk = Chunk {
            buffer: vec![1, 2],
            next_index: 3,
            file_version: 1,
        };
        assert_eq!(
            serde_json::to_string(&chunk).unwrap(),
            r#"{"buffer":[1,2],"next_index":3,"file_version":1}"#
        );
    }
}
