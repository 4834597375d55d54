use std::time::Duration;
use tracing::{debug, info};

use crate::config::PacingConfig;
use crate::forge::{Forge, ForgeError, RateLimitStatus};

/// Decides how long to wait before the next quota-consuming call.
#[derive(Debug, Clone)]
pub struct RateLimitGovernor {
    pacing: PacingConfig,
}

impl RateLimitGovernor {
    pub fn new(pacing: PacingConfig) -> Self {
        Self { pacing }
    }

    pub async fn check_budget(&self, forge: &dyn Forge) -> Result<RateLimitStatus, ForgeError> {
        forge.rate_limit().await
    }

    /// Pause for a snapshot: until reset plus buffer when quota is low,
    /// otherwise the fixed pacing interval.
    pub fn pause_for(&self, status: &RateLimitStatus) -> Duration {
        if status.remaining < self.pacing.low_water_mark {
            let until_reset = (status.reset_at - status.now).to_std().unwrap_or(Duration::ZERO);
            until_reset + self.pacing.reset_buffer()
        } else {
            self.pacing.interval()
        }
    }

    /// Check quota and sleep accordingly. Call before every quota-consuming request.
    pub async fn pace(&self, forge: &dyn Forge) -> Result<(), ForgeError> {
        let status = self.check_budget(forge).await?;
        let pause = self.pause_for(&status);
        if status.remaining < self.pacing.low_water_mark {
            info!(
                remaining = status.remaining,
                reset_at = %status.reset_at,
                sleep_secs = pause.as_secs(),
                "rate limit low, sleeping until reset"
            );
        } else {
            debug!(remaining = status.remaining, "pacing");
        }
        tokio::time::sleep(pause).await;
        Ok(())
    }

    /// Fixed wait after the forge reported quota exhaustion despite pacing.
    pub async fn cool_down(&self) {
        let pause = self.pacing.cooldown();
        tracing::error!(sleep_secs = pause.as_secs(), "rate limit exceeded, cooling down");
        tokio::time::sleep(pause).await;
    }
}
