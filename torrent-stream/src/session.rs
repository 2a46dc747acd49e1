//! Open torrents, keyed by movie id, that expire when nobody watches them.
//!
//! A [`SessionCache`] is shared between request handlers and one background
//! sweep task. Every access takes the same lock for a map lookup only, never
//! across network I/O, so two requests missing the same movie may both open
//! it and the last one to finish wins.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use torrent_parser::model::TorrentMetadata;
use tracing::debug;

/// An open torrent and the catalog file version it was opened under.
#[derive(Debug)]
pub struct Session {
    pub metadata: TorrentMetadata,
    pub file_version: u32,
}

pub trait State: Send + Sync {
    fn get(&self, movie_id: u64) -> Option<Arc<Session>>;

    /// Inserts or replaces the session of `movie_id`, expiring after `ttl`.
    fn put(&self, movie_id: u64, session: Arc<Session>, ttl: Duration);

    /// Pushes the expiry of an existing session to `ttl` from now.
    fn touch(&self, movie_id: u64, ttl: Duration);

    /// Drops the session of `movie_id` so the next access opens it again.
    fn remove(&self, movie_id: u64);
}

struct Entry {
    session: Arc<Session>,
    expires: Instant,
}

type Entries = Arc<Mutex<HashMap<u64, Entry>>>;

#[derive(Default)]
pub struct SessionCache {
    entries: Entries,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the sweep task, running one pass every `interval`. Does
    /// nothing if it is already running. Must be called from within a tokio
    /// runtime.
    pub fn start(&self, interval: Duration) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let entries = Arc::clone(&self.entries);
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sweep_entries(&entries);
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Runs one sweep pass, returning how many sessions were evicted.
    pub fn sweep(&self) -> usize {
        sweep_entries(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn sweep_entries(entries: &Mutex<HashMap<u64, Entry>>) -> usize {
    let now = Instant::now();
    let mut entries = entries.lock();
    let before = entries.len();
    entries.retain(|_, entry| entry.expires > now);

    let evicted = before - entries.len();
    if evicted > 0 {
        debug!(evicted, "evicted expired sessions");
    }
    evicted
}

impl State for SessionCache {
    fn get(&self, movie_id: u64) -> Option<Arc<Session>> {
        let entries = self.entries.lock();
        entries
            .get(&movie_id)
            .filter(|entry| entry.expires > Instant::now())
            .map(|entry| Arc::clone(&entry.session))
    }

    fn put(&self, movie_id: u64, session: Arc<Session>, ttl: Duration) {
        let expires = Instant::now() + ttl;
        self.entries
            .lock()
            .insert(movie_id, Entry { session, expires });
    }

    fn touch(&self, movie_id: u64, ttl: Duration) {
        if let Some(entry) = self.entries.lock().get_mut(&movie_id) {
            entry.expires = Instant::now() + ttl;
        }
    }

    fn remove(&self, movie_id: u64) {
        if self.entries.lock().remove(&movie_id).is_some() {
            debug!(movie_id, "dropped session");
        }
    }
}

impl Drop for SessionCache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
