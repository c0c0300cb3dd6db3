use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use super::config::Config;

pub struct AppState {
    pub config: Config,
    pub http: Client,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let config = Config::load();

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("HTTP client misconfigured!");

        Arc::new(Self { config, http })
    }
}
