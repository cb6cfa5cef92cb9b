// Audioscrobbler 1.1 submission protocol
// Plain username/password authentication with an md5 challenge

use super::traits::Submitter;
use crate::config::AudioscrobblerConfig;
use crate::event::ScrobbleRecord;
use anyhow::{Context, Result};
use std::sync::Mutex;

const PROTOCOL_VERSION: &str = "1.1";

/// Result of a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    challenge: String,
    submit_url: String,
}

pub struct AudioscrobblerClient {
    config: AudioscrobblerConfig,
    session: Mutex<Option<Session>>,
}

impl AudioscrobblerClient {
    pub fn new(config: AudioscrobblerConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    fn handshake(&self) -> Result<Session> {
        log::debug!(
            "Audioscrobbler handshake for {} at {}",
            self.config.username,
            self.config.handshake_url
        );

        let response = attohttpc::get(&self.config.handshake_url)
            .params([
                ("hs", "true"),
                ("p", PROTOCOL_VERSION),
                ("c", self.config.client_id.as_str()),
                ("v", self.config.client_version.as_str()),
                ("u", self.config.username.as_str()),
            ])
            .send()
            .context("Failed to send Audioscrobbler handshake")?;

        if !response.is_success() {
            anyhow::bail!("Audioscrobbler handshake HTTP error ({})", response.status());
        }

        let body = response
            .text()
            .context("Failed to read Audioscrobbler handshake response")?;

        parse_handshake(&body)
    }

    fn post(&self, session: &Session, record: &ScrobbleRecord) -> Result<Submission> {
        let token = session_token(&self.config.password, &session.challenge);
        let form = submission_form(&self.config.username, &token, record);

        let response = attohttpc::post(&session.submit_url)
            .form(&form)
            .context("Failed to encode Audioscrobbler submission")?
            .send()
            .context("Failed to send Audioscrobbler submission")?;

        if !response.is_success() {
            anyhow::bail!("Audioscrobbler submission HTTP error ({})", response.status());
        }

        let body = response
            .text()
            .context("Failed to read Audioscrobbler submission response")?;

        parse_submission(&body)
    }
}

impl Submitter for AudioscrobblerClient {
    fn name(&self) -> &str {
        "Audioscrobbler"
    }

    fn submit(&self, record: &ScrobbleRecord) -> Result<()> {
        let mut cached = self.session.lock().unwrap_or_else(|e| e.into_inner());

        let session = match cached.as_ref() {
            Some(session) => session.clone(),
            None => {
                let session = self.handshake()?;
                *cached = Some(session.clone());
                session
            }
        };

        match self.post(&session, record)? {
            Submission::Accepted => {
                log::info!(
                    "Audioscrobbler: Scrobbled {} - {}",
                    record.artist_name,
                    record.song_title
                );
                Ok(())
            }
            Submission::BadAuth => {
                *cached = None;
                anyhow::bail!("Audioscrobbler rejected the session (BADAUTH)")
            }
        }
    }
}

/// md5(md5(password) + challenge) as lowercase hex
fn session_token(password: &str, challenge: &str) -> String {
    let password_hash = format!("{:x}", md5::compute(password.as_bytes()));
    format!("{:x}", md5::compute(format!("{}{}", password_hash, challenge)))
}

fn submission_form(
    username: &str,
    token: &str,
    record: &ScrobbleRecord,
) -> Vec<(&'static str, String)> {
    vec![
        ("u", username.to_string()),
        ("s", token.to_string()),
        ("a[0]", record.artist_name.clone()),
        ("t[0]", record.song_title.clone()),
        ("b[0]", record.album.clone()),
        ("m[0]", record.mbid.clone()),
        ("l[0]", record.length.to_string()),
        ("i[0]", record.date_played()),
    ]
}

fn parse_handshake(body: &str) -> Result<Session> {
    let mut lines = body.lines().map(str::trim);
    let status = lines.next().unwrap_or_default();

    if status == "UPTODATE" {
        // nothing to report
    } else if let Some(url) = status.strip_prefix("UPDATE") {
        log::info!("Audioscrobbler reports a client update at {}", url.trim());
    } else if status == "BADUSER" {
        anyhow::bail!("Audioscrobbler handshake failed: unknown user");
    } else if let Some(reason) = status.strip_prefix("FAILED") {
        anyhow::bail!("Audioscrobbler handshake failed: {}", reason.trim());
    } else {
        anyhow::bail!("Unexpected Audioscrobbler handshake response: {:?}", status);
    }

    let challenge = lines
        .next()
        .filter(|l| !l.is_empty())
        .context("Audioscrobbler handshake response has no challenge")?;
    let submit_url = lines
        .next()
        .filter(|l| !l.is_empty())
        .context("Audioscrobbler handshake response has no submit URL")?;

    if let Some(interval) = lines.next().and_then(|l| l.strip_prefix("INTERVAL")) {
        log::debug!("Audioscrobbler interval: {}s", interval.trim());
    }

    Ok(Session {
        challenge: challenge.to_string(),
        submit_url: submit_url.to_string(),
    })
}

#[derive(Debug, PartialEq, Eq)]
enum Submission {
    Accepted,
    BadAuth,
}

fn parse_submission(body: &str) -> Result<Submission> {
    let status = body.lines().next().unwrap_or_default().trim();

    if status == "OK" {
        Ok(Submission::Accepted)
    } else if status == "BADAUTH" {
        Ok(Submission::BadAuth)
    } else if let Some(reason) = status.strip_prefix("FAILED") {
        anyhow::bail!("Audioscrobbler submission failed: {}", reason.trim())
    } else {
        anyhow::bail!("Unexpected Audioscrobbler submission response: {:?}", status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parses_uptodate_handshake() {
        let body = "UPTODATE\nabc123\nhttp://post.example.org/submit\nINTERVAL 1\n";
        let session = parse_handshake(body).unwrap();
        assert_eq!(
            session,
            Session {
                challenge: "abc123".to_string(),
                submit_url: "http://post.example.org/submit".to_string(),
            }
        );
    }

    #[test]
    fn parses_update_handshake() {
        let body = "UPDATE http://example.org/new-client\nabc\nhttp://post.example.org/submit\n";
        let session = parse_handshake(body).unwrap();
        assert_eq!(session.challenge, "abc");
    }

    #[test]
    fn rejects_failed_handshakes() {
        let err = parse_handshake("BADUSER\nINTERVAL 0\n").unwrap_err();
        assert!(err.to_string().contains("unknown user"));

        let err = parse_handshake("FAILED Server overloaded\nINTERVAL 60\n").unwrap_err();
        assert!(err.to_string().contains("Server overloaded"));

        let err = parse_handshake("UPTODATE\n").unwrap_err();
        assert!(err.to_string().contains("no challenge"));
    }

    #[test]
    fn parses_submission_responses() {
        assert_eq!(parse_submission("OK\nINTERVAL 1\n").unwrap(), Submission::Accepted);
        assert_eq!(parse_submission("BADAUTH\nINTERVAL 0").unwrap(), Submission::BadAuth);

        let err = parse_submission("FAILED Plugin bug: Not all request variables are set")
            .unwrap_err();
        assert!(err.to_string().contains("Not all request variables"));
    }

    #[test]
    fn token_is_double_md5() {
        // md5("dbus-cmus") concatenated with the challenge, hashed again
        let password_hash = format!("{:x}", md5::compute("dbus-cmus"));
        let expected = format!("{:x}", md5::compute(format!("{}challenge", password_hash)));

        let token = session_token("dbus-cmus", "challenge");
        assert_eq!(token, expected);
        assert_eq!(token.len(), 32);
    }

    #[test]
    fn form_carries_record_fields() {
        let record = ScrobbleRecord {
            artist_name: "Artist A".to_string(),
            song_title: "Track B".to_string(),
            length: 245,
            played_at: Utc.with_ymd_and_hms(2009, 9, 18, 22, 7, 34).unwrap(),
            album: "Album C".to_string(),
            mbid: String::new(),
        };

        let form = submission_form("dbus-cmus", "token", &record);
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };

        assert_eq!(get("u"), "dbus-cmus");
        assert_eq!(get("s"), "token");
        assert_eq!(get("a[0]"), "Artist A");
        assert_eq!(get("t[0]"), "Track B");
        assert_eq!(get("b[0]"), "Album C");
        assert_eq!(get("m[0]"), "");
        assert_eq!(get("l[0]"), "245");
        assert_eq!(get("i[0]"), "2009-09-18 22:07:34");
    }
}
