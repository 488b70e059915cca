use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::upstream::LinePayClient;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub linepay: LinePayClient,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let config = Arc::new(config);
        let linepay = LinePayClient::new(Arc::clone(&config))?;
        Ok(Self { config, linepay })
    }
}
