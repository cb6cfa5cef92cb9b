// ListenBrainz scrobbler implementation
// API Documentation: https://listenbrainz.readthedocs.io/

use super::traits::Submitter;
use crate::event::ScrobbleRecord;
use anyhow::{Context, Result};
use listenbrainz::ListenBrainz;

pub const DEFAULT_API_URL: &str = "https://api.listenbrainz.org";

pub struct ListenBrainzScrobbler {
    name: String,
    client: ListenBrainz,
}

impl ListenBrainzScrobbler {
    /// Create a client and validate `token` against the server
    pub fn new(name: String, token: &str, api_url: &str) -> Result<Self> {
        let mut client = if api_url == DEFAULT_API_URL {
            ListenBrainz::new()
        } else {
            ListenBrainz::new_with_url(api_url)
        };

        client
            .authenticate(token)
            .with_context(|| format!("Failed to authenticate with ListenBrainz ({})", name))?;

        Ok(Self {
            name: format!("ListenBrainz ({})", name),
            client,
        })
    }
}

/// Listen fields sent for a record: (artist, track, release, listened_at)
fn listen_fields(record: &ScrobbleRecord) -> (&str, &str, Option<&str>, i64) {
    let release = Some(record.album.as_str()).filter(|a| !a.is_empty());
    (
        &record.artist_name,
        &record.song_title,
        release,
        record.played_at.timestamp(),
    )
}

impl Submitter for ListenBrainzScrobbler {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, record: &ScrobbleRecord) -> Result<()> {
        log::debug!(
            "Scrobbling to {}: {} - {}",
            self.name,
            record.artist_name,
            record.song_title
        );

        // `listen` would stamp the send time; other services may have run first
        let (artist, track, release, listened_at) = listen_fields(record);
        self.client
            .import(artist, track, release, listened_at)
            .with_context(|| format!("Failed to scrobble to {}", self.name))?;

        log::info!("{}: Scrobbled successfully", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(album: &str) -> ScrobbleRecord {
        ScrobbleRecord {
            artist_name: "Artist A".to_string(),
            song_title: "Track B".to_string(),
            length: 245,
            played_at: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
            album: album.to_string(),
            mbid: String::new(),
        }
    }

    #[test]
    fn listened_at_is_the_record_time() {
        let record = record("Album C");

        let (artist, track, release, listened_at) = listen_fields(&record);

        assert_eq!(artist, "Artist A");
        assert_eq!(track, "Track B");
        assert_eq!(release, Some("Album C"));
        assert_eq!(listened_at, record.played_at.timestamp());
        assert_eq!(listened_at, 1_714_979_289);
    }

    #[test]
    fn empty_album_is_sent_without_release() {
        let record = record("");
        let (_, _, release, _) = listen_fields(&record);
        assert_eq!(release, None);
    }
}
