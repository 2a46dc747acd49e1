use std::time::Duration;

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use reqwest::Client;
use torrent_parser::{
    model::{Sha1Hash, TorrentDescriptor, TorrentMetadata, TrackerResponse},
    parse_tracker_response,
};
use tracing::{debug, warn};

use crate::{config::StreamConfig, error::TrackerError};

const PEER_ID_PREFIX: &[u8; 8] = b"-RS0100-";

/// Turns a descriptor into an open torrent by asking its tracker for peers.
#[async_trait]
pub trait Announce: Send + Sync {
    async fn announce(&self, descriptor: TorrentDescriptor) -> Result<TorrentMetadata, TrackerError>;
}

/// Announces over HTTP with a fresh peer id per announce.
pub struct TrackerClient {
    client: Client,
    port: u16,
}

impl TrackerClient {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, TrackerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(TrackerClient { client, port })
    }

    pub fn from_config(config: &StreamConfig) -> Result<Self, TrackerError> {
        Self::new(config.port, config.tracker_timeout())
    }

    fn announce_url(&self, descriptor: &TorrentDescriptor, peer_id: &Sha1Hash) -> String {
        // info_hash and peer_id are raw bytes, encode them by hand
        let separator = if descriptor.announce.contains('?') { '&' } else { '?' };
        format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1&event=started",
            descriptor.announce,
            separator,
            urlencoding::encode_binary(&descriptor.info_hash),
            urlencoding::encode_binary(peer_id),
            self.port,
            descriptor.length,
        )
    }
}

#[async_trait]
impl Announce for TrackerClient {
    async fn announce(&self, descriptor: TorrentDescriptor) -> Result<TorrentMetadata, TrackerError> {
        let peer_id = generate_peer_id();
        let url = self.announce_url(&descriptor, &peer_id);
        debug!(name = %descriptor.name, "announcing to {}", descriptor.announce);

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        match parse_tracker_response(&body)? {
            TrackerResponse::Failure(reason) => Err(TrackerError::Failure(reason)),
            TrackerResponse::Success(response) => {
                if let Some(warning) = &response.warning {
                    warn!(name = %descriptor.name, "tracker warning: {warning}");
                }
                if response.peers.is_empty() {
                    return Err(TrackerError::NoPeers);
                }
                debug!(peers = response.peers.len(), "tracker answered");

                Ok(TorrentMetadata {
                    descriptor,
                    peers: response.peers,
                    peer_id,
                })
            }
        }
    }
}

/// `-RS0100-` followed by 12 random alphanumeric bytes.
pub fn generate_peer_id() -> Sha1Hash {
    let mut peer_id = [0; 20];
    peer_id[..8].copy_from_slice(PEER_ID_PREFIX);
    for (slot, byte) in peer_id[8..]
        .iter_mut()
        .zip(thread_rng().sample_iter(&Alphanumeric))
    {
        *slot = byte;
    }
    peer_id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(announce: &str) -> TorrentDescriptor {
        TorrentDescriptor {
            announce: announce.to_string(),
            announce_list: None,
            comment: None,
            created_by: None,
            creation_date: None,
            name: "movie.mp4".to_string(),
            piece_length: 16_384,
            pieces: vec![[0; 20]],
            private: None,
            files: None,
            length: 1000,
            info_hash: [1; 20],
        }
    }

    #[test]
    fn peer_id_layout() {
        let peer_id = generate_peer_id();
        assert_eq!(&peer_id[..8], b"-RS0100-");
        assert!(peer_id[8..].iter().all(u8::is_ascii_alphanumeric));
        assert_ne!(generate_peer_id(), peer_id);
    }

    #[test]
    fn announce_url_encodes_raw_bytes() {
        let client = TrackerClient::new(6881, Duration::from_secs(1)).unwrap();
        let url = client.announce_url(&descriptor("http://tracker/announce"), &[b'a'; 20]);

        assert!(url.starts_with("http://tracker/announce?info_hash=%01%01"));
        assert!(url.contains(&format!("&peer_id={}&", "a".repeat(20))));
        assert!(url.contains("&port=6881&"));
        assert!(url.contains("&left=1000&"));
        assert!(url.ends_with("&compact=1&event=started"));
    }

    #[test]
    fn announce_url_keeps_existing_query() {
        let client = TrackerClient::new(6881, Duration::from_secs(1)).unwrap();
        let url = client.announce_url(&descriptor("http://tracker/announce?key=k"), &[b'a'; 20]);

        assert!(url.starts_with("http://tracker/announce?key=k&info_hash="));
    }
}
