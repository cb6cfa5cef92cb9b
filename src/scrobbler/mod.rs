// Scrobbler module
// Contains implementations for various scrobbling services

pub mod audioscrobbler;
pub mod lastfm;
pub mod lastfm_auth;
pub mod listenbrainz;
pub mod traits;

pub use traits::Submitter;

use crate::config::Config;
use crate::event::ScrobbleRecord;
use anyhow::Result;

/// Every enabled scrobbling service, submitted to in config order
pub struct Services {
    name: String,
    services: Vec<Box<dyn Submitter>>,
}

impl Services {
    pub fn new(services: Vec<Box<dyn Submitter>>) -> Self {
        let name = if services.is_empty() {
            "no services".to_string()
        } else {
            services
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", ")
        };

        Self { name, services }
    }

    /// Build the services enabled in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut services: Vec<Box<dyn Submitter>> = Vec::new();

        if let Some(cfg) = config.audioscrobbler.as_ref().filter(|c| c.enabled) {
            log::info!("Audioscrobbler enabled for user {}", cfg.username);
            services.push(Box::new(audioscrobbler::AudioscrobblerClient::new(cfg.clone())));
        }

        if let Some(cfg) = config.lastfm.as_ref().filter(|c| c.enabled) {
            if cfg.session_key.is_empty() {
                log::warn!("Last.fm is enabled but has no session key; run with --auth-lastfm");
            } else {
                log::info!("Last.fm enabled");
                services.push(Box::new(lastfm::LastFmScrobbler::new(
                    &cfg.api_key,
                    &cfg.api_secret,
                    &cfg.session_key,
                )));
            }
        }

        for cfg in config.listenbrainz.iter().filter(|c| c.enabled) {
            log::info!("ListenBrainz ({}) enabled", cfg.name);
            services.push(Box::new(listenbrainz::ListenBrainzScrobbler::new(
                cfg.name.clone(),
                &cfg.token,
                &cfg.api_url,
            )?));
        }

        if services.is_empty() {
            log::warn!("No scrobbling services are enabled; records will only be logged");
        }

        Ok(Self::new(services))
    }
}

impl Submitter for Services {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, record: &ScrobbleRecord) -> Result<()> {
        let mut failed = Vec::new();

        for service in &self.services {
            if let Err(e) = service.submit(record) {
                log::error!("{}: {:#}", service.name(), e);
                failed.push(service.name().to_string());
            }
        }

        if !failed.is_empty() {
            anyhow::bail!("Submission failed for {}", failed.join(", "));
        }

        Ok(())
    }
}
