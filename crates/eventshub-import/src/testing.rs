//! A live server for end-to-end tests.

use std::sync::Arc;
use std::time::Duration;

use eventshub_server::{EventRepository, EventServer, MemoryRepository, ServerConfig};

use crate::config::{ImportConfig, ImportCredentials};

/// Cheapest bcrypt cost, to keep logins fast.
const TEST_COST: u32 = 4;

pub(crate) struct TestServer {
    pub server: EventServer,
    pub repository: Arc<dyn EventRepository>,
    pub config: ImportConfig,
}

impl TestServer {
    pub async fn start(token_lifetime: Duration) -> Self {
        let config = ServerConfig::new(
            "admin",
            bcrypt::hash("pw", TEST_COST).unwrap(),
            "token-secret",
            "kill-secret",
        )
        .with_address("127.0.0.1", 0)
        .with_token_lifetime(token_lifetime)
        .with_bcrypt_cost(TEST_COST);
        let repository: Arc<dyn EventRepository> =
            Arc::new(MemoryRepository::default().with_bcrypt_cost(TEST_COST));
        let mut server = EventServer::with_repository(config, Arc::clone(&repository)).unwrap();
        let addr = server.start().await.unwrap();

        Self {
            server,
            repository,
            config: ImportConfig {
                host: addr.ip().to_string(),
                port: addr.port(),
                source_files_paths: Vec::new(),
                scheme: "http".to_string(),
            },
        }
    }

    pub fn credentials(&self) -> ImportCredentials {
        ImportCredentials::new("admin", "pw")
    }

    pub async fn stop(mut self) {
        self.server.stop().await.unwrap();
    }
}
