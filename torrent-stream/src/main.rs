use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use torrent_pwp::PieceFetcher;
use torrent_stream::{
    logging::init_tracing, storage::JsonStorage, Chunk, ChunkRequest, SessionCache, StreamConfig,
    Streamer, TrackerClient,
};
use tracing::{error, Level};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream movie chunks straight from a torrent swarm")]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON catalog of movies and their descriptor paths.
    #[arg(long, default_value = "catalog.json")]
    catalog: PathBuf,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Where the chunk bytes are written.
    #[arg(short, long, default_value = "chunk.bin")]
    out: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the first chunk of a movie.
    StartWatch { id: u64 },
    /// Fetch one chunk, numbered under the given file version.
    Chunk {
        id: String,
        file_version: String,
        index: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(args.log_level) {
        eprintln!("cannot set up logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => StreamConfig::load(path)?,
        None => StreamConfig::default(),
    };

    let catalog = Arc::new(JsonStorage::open(&args.catalog).await?);
    let sessions = Arc::new(SessionCache::new());
    sessions.start(config.sweep_interval());

    let streamer = Streamer::new(
        catalog.clone(),
        catalog,
        sessions.clone(),
        Arc::new(TrackerClient::from_config(&config)?),
        Arc::new(PieceFetcher::new(config.peer_config())),
        &config,
    );

    let chunk: Chunk = match args.command {
        Command::StartWatch { id } => streamer.start_watch(id).await?,
        Command::Chunk {
            id,
            file_version,
            index,
        } => {
            let request = ChunkRequest::parse(&id, &file_version, &index)?;
            streamer.get_chunk(request).await?
        }
    };
    sessions.stop();

    tokio::fs::write(&args.out, &chunk.buffer).await?;
    println!(
        "wrote {} bytes to {}, next index {}, file version {}",
        chunk.buffer.len(),
        args.out.display(),
        chunk.next_index,
        chunk.file_version
    );

    Ok(())
}
