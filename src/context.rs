use std::sync::Arc;

use tokio::time::Instant;

use crate::auth::{Credential, TokenProvider};
use crate::config::{HarnessConfig, Settings, TargetEndpoint};
use crate::error::HarnessError;
use crate::stats::Stats;

#[derive(Debug)]
pub struct HarnessContext {
    pub config: HarnessConfig,
    pub endpoint: TargetEndpoint,
    pub tokens: Arc<TokenProvider>,
    pub stats: Arc<Stats>,
    clock: Instant,
}

impl HarnessContext {
    pub fn new(config: HarnessConfig, endpoint: TargetEndpoint, tokens: TokenProvider, stats: Stats) -> Self {
        Self {
            config,
            endpoint,
            tokens: Arc::new(tokens),
            stats: Arc::new(stats),
            clock: Instant::now(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, HarnessError> {
        let config = settings.harness_config()?;
        let conn = settings.connection_string()?;
        let endpoint = TargetEndpoint::from_settings(settings, &conn)?;
        let credential = Credential::from_access_key(&conn.access_key)?;
        let tokens = TokenProvider::new(credential, settings.token_ttl()?);

        Ok(Self::new(config, endpoint, tokens, Stats::new()?))
    }

    /// Monotonic timestamp carried in every message, in microseconds since startup.
    pub fn timestamp(&self) -> String {
        self.clock.elapsed().as_micros().to_string()
    }
}
