// Last.fm scrobbler implementation

use super::traits::Submitter;
use crate::event::ScrobbleRecord;
use anyhow::{Context, Result};
use rustfm_scrobble_proxy::{Scrobble, Scrobbler};
use std::sync::Mutex;

pub struct LastFmScrobbler {
    // Locked only so the submitter is Sync; `Scrobbler` is not documented as Sync
    scrobbler: Mutex<Scrobbler>,
}

impl LastFmScrobbler {
    pub fn new(api_key: &str, api_secret: &str, session_key: &str) -> Self {
        let mut scrobbler = Scrobbler::new(api_key, api_secret);
        scrobbler.authenticate_with_session_key(session_key);
        Self {
            scrobbler: Mutex::new(scrobbler),
        }
    }
}

impl Submitter for LastFmScrobbler {
    fn name(&self) -> &str {
        "Last.fm"
    }

    fn submit(&self, record: &ScrobbleRecord) -> Result<()> {
        let album = Some(record.album.as_str()).filter(|a| !a.is_empty());
        let mut scrobble = Scrobble::new(&record.artist_name, &record.song_title, album);
        scrobble.with_timestamp(record.played_at.timestamp().max(0) as u64);

        let scrobbler = self.scrobbler.lock().unwrap_or_else(|e| e.into_inner());
        scrobbler
            .scrobble(&scrobble)
            .context("Failed to scrobble to Last.fm")?;

        log::info!(
            "Last.fm: Scrobbled {} - {}",
            record.artist_name,
            record.song_title
        );
        Ok(())
    }
}
