//! Scheduled generation
//!
//! Periodic freshness-gated generation, replacing an external cron hitting
//! the generate endpoint.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::cache::SharedCache;
use crate::services::blog::generate_and_invalidate;
use crate::services::generator::{BlogGenerator, GenerationOutcome};

/// Spawn the generation loop. The first run happens one interval after start.
pub fn spawn_scheduler(
    generator: Arc<BlogGenerator>,
    cache: SharedCache,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            match generate_and_invalidate(&generator, &cache, None).await {
                Ok(GenerationOutcome::Generated(blog)) => {
                    info!("Scheduled generation stored post {}", blog.id);
                }
                Ok(GenerationOutcome::Existing(_)) => {
                    info!("Scheduled generation skipped, latest post is fresh");
                }
                Err(e) => error!("Scheduled generation failed: {}", e),
            }
        }
    })
}
