//! Opening the MongoDB client behind the quiz store.

use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

/// Waits between pings while the server comes up: doubling, capped, and finite.
#[derive(Debug, Clone)]
struct PingBackoff {
    remaining: u32,
    delay: Duration,
}

impl PingBackoff {
    const ATTEMPTS: u32 = 10;
    const FIRST_DELAY: Duration = Duration::from_millis(250);
    const MAX_DELAY: Duration = Duration::from_secs(5);

    fn new() -> Self {
        Self {
            remaining: Self::ATTEMPTS - 1,
            delay: Self::FIRST_DELAY,
        }
    }
}

impl Iterator for PingBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.delay;
        self.delay = (current * 2).min(Self::MAX_DELAY);
        Some(current)
    }
}

/// Open a client on `database_name` and hold until the server answers a ping.
///
/// Fails with [`MongoDaoError::InitialPing`] once the backoff is spent, leaving the
/// application in degraded mode.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut backoff = PingBackoff::new();
    let mut attempts = 0;
    loop {
        attempts += 1;
        let Err(source) = database.run_command(doc! { "ping": 1 }).await else {
            break;
        };
        match backoff.next() {
            Some(delay) => {
                debug!(attempts, ?delay, database = database_name, "MongoDB not answering yet");
                sleep(delay).await;
            }
            None => return Err(MongoDaoError::InitialPing { attempts, source }),
        }
    }

    Ok((client, database))
}
