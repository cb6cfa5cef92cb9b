// Last.fm authentication helper using rustfm-scrobble-proxy

use crate::config::Config;
use anyhow::{Context, Result};
use rustfm_scrobble_proxy::Scrobbler;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Exchange a username/password for a Last.fm session key
pub fn authenticate(api_key: &str, api_secret: &str) -> Result<String> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    let username = prompt(&mut input, "Last.fm Username: ")?;
    let password = prompt(&mut input, "Last.fm Password: ")?;

    println!("\nAuthenticating with Last.fm...");
    let mut scrobbler = Scrobbler::new(api_key, api_secret);
    let session = scrobbler
        .authenticate_with_password(&username, &password)
        .context("Last.fm rejected the credentials")?;

    Ok(session.key)
}

/// Run the interactive flow and store the session key in the config at `path`
pub fn authenticate_and_save(config: &mut Config, path: &Path) -> Result<()> {
    let lastfm = config
        .lastfm
        .as_mut()
        .context("No [lastfm] section in the config file")?;

    if lastfm.api_key.is_empty() || lastfm.api_secret.is_empty() {
        anyhow::bail!("Set lastfm.api_key and lastfm.api_secret in {:?} first", path);
    }

    lastfm.session_key = authenticate(&lastfm.api_key, &lastfm.api_secret)?;
    lastfm.enabled = true;
    config.save_to(path)?;

    println!("Session key saved to {:?}", path);
    Ok(())
}

fn prompt(input: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
