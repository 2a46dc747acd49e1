pub mod adapter;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod storage;
pub mod streaming;
pub mod tracker;

pub use config::StreamConfig;
pub use session::SessionCache;
pub use streaming::{Chunk, ChunkRequest, Streamer};
pub use tracker::TrackerClient;
