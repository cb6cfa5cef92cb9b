// Common traits for scrobbling services

use crate::event::ScrobbleRecord;
use anyhow::Result;

/// A service that accepts scrobble records
///
/// Calls are blocking; the run loop moves them off the bus reader.
pub trait Submitter: Send + Sync {
    /// Human readable service name used in logs
    fn name(&self) -> &str;

    /// Submit a single record
    fn submit(&self, record: &ScrobbleRecord) -> Result<()>;
}
