// Playback event model
// Typed view of the NowPlaying signal payload and the record derived from it

use crate::error::BridgeError;
use chrono::{DateTime, Utc};
use zbus::zvariant::Value;

/// Format of the `date_played` field sent to scrobbling services
pub const DATE_PLAYED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of positional fields carried by a NowPlaying signal
const PAYLOAD_ARITY: usize = 7;

/// Player operation that triggered the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCode {
    Seek,
    Next,
    Prev,
    Stop,
    SortedEnter,
    PlaylistEnter,
    TreeEnter,
    /// The player advanced to the next track on its own
    AutoNext,
}

impl TryFrom<i64> for EventCode {
    type Error = BridgeError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Seek,
            1 => Self::Next,
            2 => Self::Prev,
            3 => Self::Stop,
            4 => Self::SortedEnter,
            5 => Self::PlaylistEnter,
            6 => Self::TreeEnter,
            7 => Self::AutoNext,
            other => {
                return Err(BridgeError::invalid_payload(format!(
                    "unknown event code {}",
                    other
                )))
            }
        })
    }
}

/// One delivery of the NowPlaying signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub code: EventCode,
    pub artist: String,
    pub track: String,
    pub album: String,
    pub track_number: i64,
    pub duration_secs: i64,
    pub position: i64,
}

impl PlaybackEvent {
    /// Decode the positional signal body
    /// (code, artist, track, album, track number, duration, position)
    pub fn from_fields(fields: &[Value<'_>]) -> Result<Self, BridgeError> {
        if fields.len() != PAYLOAD_ARITY {
            return Err(BridgeError::invalid_payload(format!(
                "expected {} fields, got {}",
                PAYLOAD_ARITY,
                fields.len()
            )));
        }

        Ok(Self {
            code: EventCode::try_from(integer_field(fields, 0, "event code")?)?,
            artist: string_field(fields, 1, "artist")?,
            track: string_field(fields, 2, "track")?,
            album: string_field(fields, 3, "album")?,
            track_number: integer_field(fields, 4, "track number")?,
            duration_secs: integer_field(fields, 5, "duration")?,
            position: integer_field(fields, 6, "position")?,
        })
    }

    /// Decode the body of a bus message
    pub fn from_message(message: &zbus::Message) -> Result<Self, BridgeError> {
        let body = message.body();
        let structure: zbus::zvariant::Structure<'_> = body
            .deserialize()
            .map_err(|e| BridgeError::invalid_payload(e.to_string()))?;

        Self::from_fields(structure.fields())
    }
}

fn integer_field(fields: &[Value<'_>], index: usize, name: &str) -> Result<i64, BridgeError> {
    let value = match &fields[index] {
        Value::U8(v) => i64::from(*v),
        Value::I16(v) => i64::from(*v),
        Value::U16(v) => i64::from(*v),
        Value::I32(v) => i64::from(*v),
        Value::U32(v) => i64::from(*v),
        Value::I64(v) => *v,
        Value::U64(v) => i64::try_from(*v).map_err(|_| {
            BridgeError::invalid_payload(format!("{} (field {}) out of range: {}", name, index, v))
        })?,
        other => {
            return Err(BridgeError::invalid_payload(format!(
                "{} (field {}) must be an integer, got signature {}",
                name,
                index,
                other.value_signature()
            )))
        }
    };
    Ok(value)
}

fn string_field(fields: &[Value<'_>], index: usize, name: &str) -> Result<String, BridgeError> {
    match &fields[index] {
        Value::Str(s) => Ok(s.as_str().to_string()),
        other => Err(BridgeError::invalid_payload(format!(
            "{} (field {}) must be a string, got signature {}",
            name,
            index,
            other.value_signature()
        ))),
    }
}

/// A single scrobble, built from an auto-advance event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleRecord {
    pub artist_name: String,
    pub song_title: String,
    pub length: i64,
    pub played_at: DateTime<Utc>,
    pub album: String,
    /// MusicBrainz id; the player never provides one
    pub mbid: String,
}

impl ScrobbleRecord {
    /// Build a record for `event`, or `None` unless the player auto-advanced
    pub fn from_event(event: &PlaybackEvent, played_at: DateTime<Utc>) -> Option<Self> {
        if event.code != EventCode::AutoNext {
            return None;
        }

        Some(Self {
            artist_name: event.artist.clone(),
            song_title: event.track.clone(),
            length: event.duration_secs,
            played_at,
            album: event.album.clone(),
            mbid: String::new(),
        })
    }

    /// Time played rendered as `YYYY-MM-DD HH:MM:SS` (UTC)
    pub fn date_played(&self) -> String {
        self.played_at.format(DATE_PLAYED_FORMAT).to_string()
    }
}
