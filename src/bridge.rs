// Event bridge
// Turns auto-advance playback events into scrobble submissions

use crate::error::BridgeError;
use crate::event::{PlaybackEvent, ScrobbleRecord};
use crate::scrobbler::Submitter;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct Bridge {
    submitter: Arc<dyn Submitter>,
}

impl Bridge {
    pub fn new(submitter: Arc<dyn Submitter>) -> Self {
        Self { submitter }
    }

    /// Handle one signal delivery, stamping the record with the current time
    ///
    /// Returns the submitted record, or `None` when the event is ignored.
    pub fn on_playback_event(
        &self,
        event: &PlaybackEvent,
    ) -> Result<Option<ScrobbleRecord>, BridgeError> {
        self.on_playback_event_at(event, Utc::now())
    }

    fn on_playback_event_at(
        &self,
        event: &PlaybackEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<ScrobbleRecord>, BridgeError> {
        let Some(record) = ScrobbleRecord::from_event(event, now) else {
            log::debug!("Ignoring {:?} event for {} - {}", event.code, event.artist, event.track);
            return Ok(None);
        };

        log::info!(
            "Scrobbling: {} - {} ({}s) via {}",
            record.artist_name,
            record.song_title,
            record.length,
            self.submitter.name()
        );

        self.submitter
            .submit(&record)
            .map_err(BridgeError::Submission)?;

        Ok(Some(record))
    }
}
