//! Background list synchronization.
//!
//! A single long-lived task drives the periodic database sync. On
//! success the verdict cache is flushed (prefix churn invalidates prior
//! adjudications) and the next delay comes from the server's suggestion.
//! Failures back off exponentially instead of hammering the service.

use crate::api::ThreatApi;
use crate::cache::Cache;
use crate::database::Database;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

const BACKOFF_MIN: Duration = Duration::from_secs(60);
const BACKOFF_MAX: Duration = Duration::from_secs(24 * 60 * 60);

pub(crate) async fn run(
    db: Arc<Database>,
    cache: Arc<Cache>,
    api: Arc<dyn ThreatApi>,
    request_timeout: Duration,
    initial_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut delay = initial_delay;
    let mut backoff: Option<Duration> = None;

    loop {
        debug!("next update in {delay:?}");
        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => {
                info!("updater stopped");
                return;
            }
        }

        match timeout(request_timeout, db.update(api.as_ref())).await {
            Ok((next, true)) => {
                cache.purge();
                debug!("threat lists updated, cache flushed");
                backoff = None;
                delay = next;
            }
            Ok((_, false)) => {
                delay = next_backoff(&mut backoff);
                warn!("update failed, retrying in {delay:?}");
            }
            Err(_) => {
                delay = next_backoff(&mut backoff);
                warn!("update timed out, retrying in {delay:?}");
            }
        }
    }
}

fn next_backoff(backoff: &mut Option<Duration>) -> Duration {
    let next = match *backoff {
        None => BACKOFF_MIN,
        Some(cur) => (cur * 2).min(BACKOFF_MAX),
    };
    *backoff = Some(next);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut backoff = None;
        assert_eq!(next_backoff(&mut backoff), Duration::from_secs(60));
        assert_eq!(next_backoff(&mut backoff), Duration::from_secs(120));
        assert_eq!(next_backoff(&mut backoff), Duration::from_secs(240));
        for _ in 0..20 {
            next_backoff(&mut backoff);
        }
        assert_eq!(next_backoff(&mut backoff), BACKOFF_MAX);
    }
}
