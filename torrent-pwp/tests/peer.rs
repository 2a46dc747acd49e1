use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use sha1::{Digest, Sha1};
use tokio::{
    net::{TcpListener, TcpStream},
    time::{sleep, timeout},
};
use tokio_util::codec::{Framed, FramedParts};
use torrent_parser::model::{Peer, Sha1Hash, TorrentDescriptor, TorrentMetadata};
use torrent_pwp::{
    bitfield::Bitfield,
    error::{FetchError, PeerError},
    handshake::{Handshake, HandshakeCodec},
    message::{Block, BlockInfo, Message, MessageCodec},
    PeerClient, PeerConfig, PieceFetcher,
};

const INFO_HASH: Sha1Hash = [0xab; 20];
const PIECE_LENGTH: usize = 16_384;

fn content() -> Vec<u8> {
    (0..40_000u32).map(|i| (i % 251) as u8).collect()
}

fn metadata(content: &[u8], peers: &[SocketAddr]) -> TorrentMetadata {
    TorrentMetadata {
        descriptor: TorrentDescriptor {
            announce: "http://127.0.0.1:6969/announce".to_string(),
            announce_list: None,
            comment: None,
            created_by: None,
            creation_date: None,
            name: "movie.mp4".to_string(),
            piece_length: PIECE_LENGTH as u64,
            pieces: content
                .chunks(PIECE_LENGTH)
                .map(|chunk| Sha1::digest(chunk).into())
                .collect(),
            private: None,
            files: None,
            length: content.len() as u64,
            info_hash: INFO_HASH,
        },
        peers: peers.iter().copied().map(Peer::from).collect(),
        peer_id: [1; 20],
    }
}

/// Behaviour of a fake seeding peer.
#[derive(Clone)]
struct Seed {
    content: Vec<u8>,
    info_hash: Sha1Hash,
    held: Option<Vec<usize>>,
    keep_alive_before_unchoke: bool,
    choke_after_first_block: bool,
    corrupt: bool,
    have_before_bitfield: bool,
    unchoke_delay: Duration,
    /// Requests that arrived while the peer was still choked.
    early_requests: Arc<AtomicUsize>,
}

impl Seed {
    fn new(content: Vec<u8>) -> Self {
        Seed {
            content,
            info_hash: INFO_HASH,
            held: None,
            keep_alive_before_unchoke: false,
            choke_after_first_block: false,
            corrupt: false,
            have_before_bitfield: false,
            unchoke_delay: Duration::ZERO,
            early_requests: Arc::default(),
        }
    }
}

async fn spawn_seeder(seed: Seed) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seed = seed.clone();
            tokio::spawn(async move {
                let _ = serve(stream, seed).await;
            });
        }
    });
    addr
}

async fn serve(stream: TcpStream, seed: Seed) -> Result<(), PeerError> {
    let mut socket = Framed::new(stream, HandshakeCodec);
    if socket.next().await.transpose()?.is_none() {
        return Ok(());
    }
    socket.send(Handshake::new(seed.info_hash, [9; 20])).await?;

    let handshake_parts = socket.into_parts();
    let mut parts = FramedParts::new::<Message>(handshake_parts.io, MessageCodec);
    parts.read_buf = handshake_parts.read_buf;
    let mut socket = Framed::from_parts(parts);

    let pieces = seed.content.len().div_ceil(PIECE_LENGTH);
    let mut bitfield = Bitfield::new(pieces);
    for index in 0..pieces {
        if seed.held.as_ref().map_or(true, |held| held.contains(&index)) {
            bitfield.set(index);
        }
    }
    if seed.have_before_bitfield {
        socket.send(Message::Have(0)).await?;
    }
    socket.send(Message::Bitfield(bitfield)).await?;

    let mut unchoked = false;
    let mut choked_once = false;
    while let Some(message) = socket.next().await {
        match message? {
            Message::Interested => {
                if seed.keep_alive_before_unchoke {
                    socket.send(Message::KeepAlive).await?;
                }
                sleep(seed.unchoke_delay).await;
                socket.send(Message::Unchoke).await?;
                unchoked = true;
            }
            Message::Request(BlockInfo {
                index,
                begin,
                length,
            }) => {
                if !unchoked {
                    seed.early_requests.fetch_add(1, Ordering::SeqCst);
                }
                let start = index as usize * PIECE_LENGTH + begin as usize;
                let mut data = seed.content[start..start + length as usize].to_vec();
                if seed.corrupt {
                    data[0] ^= 0xff;
                }
                socket
                    .send(Message::Piece(Block { index, begin, data }))
                    .await?;

                if seed.choke_after_first_block && !choked_once {
                    choked_once = true;
                    socket.send(Message::Choke).await?;
                    socket.send(Message::Unchoke).await?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// An address nothing listens on.
async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn test_download_piece() {
    let content = content();
    let seeder = spawn_seeder(Seed::new(content.clone())).await;

    let piece = PieceFetcher::default()
        .fetch(&metadata(&content, &[seeder]), 1)
        .await
        .unwrap();

    assert_eq!(piece.index, 1);
    assert_eq!(piece.buf, &content[PIECE_LENGTH..2 * PIECE_LENGTH]);
    assert_eq!(piece.hash, <[u8; 20]>::from(Sha1::digest(&piece.buf)));
}

#[tokio::test]
async fn test_short_last_piece() {
    let content = content();
    let seeder = spawn_seeder(Seed::new(content.clone())).await;

    let piece = PieceFetcher::default()
        .fetch(&metadata(&content, &[seeder]), 2)
        .await
        .unwrap();

    assert_eq!(piece.buf.len(), 40_000 - 2 * PIECE_LENGTH);
    assert_eq!(piece.buf, &content[2 * PIECE_LENGTH..]);
}

#[tokio::test]
async fn test_skips_failing_peers_in_order() {
    let content = content();
    let unreachable = closed_addr().await;
    let lacking = spawn_seeder(Seed {
        held: Some(vec![0]),
        ..Seed::new(content.clone())
    })
    .await;
    let seeder = spawn_seeder(Seed::new(content.clone())).await;

    let piece = PieceFetcher::default()
        .fetch(&metadata(&content, &[unreachable, lacking, seeder]), 2)
        .await
        .unwrap();

    assert_eq!(piece.buf, &content[2 * PIECE_LENGTH..]);
}

#[tokio::test]
async fn test_out_of_range_index_contacts_no_peer() {
    let content = content();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let result = PieceFetcher::default()
        .fetch(&metadata(&content, &[addr]), 3)
        .await;

    assert!(matches!(
        result,
        Err(FetchError::IndexOutOfRange { index: 3, count: 3 })
    ));
    assert!(timeout(Duration::from_millis(200), listener.accept())
        .await
        .is_err());
}

#[tokio::test]
async fn test_info_hash_mismatch() {
    let content = content();
    let seeder = spawn_seeder(Seed {
        info_hash: [0xcd; 20],
        ..Seed::new(content.clone())
    })
    .await;

    let result = PieceFetcher::default()
        .fetch(&metadata(&content, &[seeder]), 0)
        .await;

    assert!(matches!(result, Err(FetchError::NoPeerHasPiece(0))));
}

#[tokio::test]
async fn test_keep_alive_aborts_peer_by_default() {
    let content = content();
    let seeder = spawn_seeder(Seed {
        keep_alive_before_unchoke: true,
        ..Seed::new(content.clone())
    })
    .await;

    let result = PieceFetcher::default()
        .fetch(&metadata(&content, &[seeder]), 0)
        .await;

    assert!(matches!(result, Err(FetchError::NoPeerHasPiece(0))));
}

#[tokio::test]
async fn test_keep_alive_tolerated_when_configured() {
    let content = content();
    let seeder = spawn_seeder(Seed {
        keep_alive_before_unchoke: true,
        ..Seed::new(content.clone())
    })
    .await;
    let fetcher = PieceFetcher::new(PeerConfig {
        tolerate_keep_alive: true,
        ..PeerConfig::default()
    });

    let piece = fetcher
        .fetch(&metadata(&content, &[seeder]), 0)
        .await
        .unwrap();

    assert_eq!(piece.buf, &content[..PIECE_LENGTH]);
}

#[tokio::test]
async fn test_resumes_after_choke() {
    let content = content();
    let seeder = spawn_seeder(Seed {
        choke_after_first_block: true,
        ..Seed::new(content.clone())
    })
    .await;

    let piece = PieceFetcher::default()
        .fetch(&metadata(&content, &[seeder]), 1)
        .await
        .unwrap();

    assert_eq!(piece.buf, &content[PIECE_LENGTH..2 * PIECE_LENGTH]);
}

#[tokio::test]
async fn test_corrupt_piece_served_without_verification() {
    let content = content();
    let seeder = spawn_seeder(Seed {
        corrupt: true,
        ..Seed::new(content.clone())
    })
    .await;

    let piece = PieceFetcher::default()
        .fetch(&metadata(&content, &[seeder]), 0)
        .await
        .unwrap();

    assert_ne!(piece.buf, &content[..PIECE_LENGTH]);
    assert_eq!(piece.buf[0], content[0] ^ 0xff);
}

#[tokio::test]
async fn test_corrupt_piece_rejected_with_verification() {
    let content = content();
    let corrupt = spawn_seeder(Seed {
        corrupt: true,
        ..Seed::new(content.clone())
    })
    .await;
    let honest = spawn_seeder(Seed::new(content.clone())).await;
    let config = PeerConfig {
        verify_piece_hashes: true,
        ..PeerConfig::default()
    };

    let only_corrupt = PieceFetcher::new(config)
        .fetch(&metadata(&content, &[corrupt]), 0)
        .await;
    assert!(matches!(only_corrupt, Err(FetchError::NoPeerHasPiece(0))));

    let piece = PieceFetcher::new(config)
        .fetch(&metadata(&content, &[corrupt, honest]), 0)
        .await
        .unwrap();
    assert_eq!(piece.buf, &content[..PIECE_LENGTH]);
}

#[tokio::test]
async fn test_first_message_must_be_bitfield() {
    let content = content();
    let seeder = spawn_seeder(Seed {
        have_before_bitfield: true,
        ..Seed::new(content.clone())
    })
    .await;

    let connected = PeerClient::connect(seeder, INFO_HASH, [1; 20], PeerConfig::default()).await;
    assert!(matches!(
        connected,
        Err(PeerError::UnexpectedMessage {
            expected: "bitfield",
            found: "have"
        })
    ));

    let result = PieceFetcher::default()
        .fetch(&metadata(&content, &[seeder]), 0)
        .await;
    assert!(matches!(result, Err(FetchError::NoPeerHasPiece(0))));
}

#[tokio::test]
async fn test_no_requests_while_choked() {
    let content = content();
    let early_requests = Arc::new(AtomicUsize::new(0));
    let seeder = spawn_seeder(Seed {
        unchoke_delay: Duration::from_millis(100),
        early_requests: Arc::clone(&early_requests),
        ..Seed::new(content.clone())
    })
    .await;

    let piece = PieceFetcher::default()
        .fetch(&metadata(&content, &[seeder]), 1)
        .await
        .unwrap();

    assert_eq!(piece.buf, &content[PIECE_LENGTH..2 * PIECE_LENGTH]);
    assert_eq!(early_requests.load(Ordering::SeqCst), 0);
}
