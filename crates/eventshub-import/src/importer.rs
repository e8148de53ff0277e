//! Batch upload of XML exports.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::client::EventsHubClient;
use crate::error::{ImportError, ImportResult};
use crate::xml::{self, XmlEvent};

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub submitted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ImportSummary {
    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} submitted: {} inserted, {} updated, {} unchanged, {} failed",
            self.submitted, self.inserted, self.updated, self.unchanged, self.failed
        )
    }
}

/// Uploads every event of a set of export files.
pub struct Importer {
    client: EventsHubClient,
}

impl Importer {
    pub fn new(client: EventsHubClient) -> Self {
        Self { client }
    }

    /// Reads all files, then uploads their events in file order.
    ///
    /// Nothing is uploaded unless every file parses. Individual events that
    /// fail to convert or are refused by the server are counted as failed
    /// and the run continues.
    ///
    /// # Errors
    ///
    /// Unreadable or malformed files, and login failures, abort the run.
    pub async fn import_files(&mut self, paths: &[PathBuf]) -> ImportResult<ImportSummary> {
        let mut batches = Vec::with_capacity(paths.len());
        for path in paths {
            info!(path = %path.display(), "Reading events");
            batches.push((path, xml::load_file(path)?));
        }

        let mut summary = ImportSummary::default();
        for (path, events) in batches {
            debug!(path = %path.display(), count = events.len(), "Uploading events");
            for element in &events {
                self.import_one(element, &mut summary).await?;
            }
        }
        info!(%summary, "Import finished");
        Ok(summary)
    }

    async fn import_one(
        &mut self,
        element: &XmlEvent,
        summary: &mut ImportSummary,
    ) -> ImportResult<()> {
        summary.submitted += 1;
        let event = match element.to_event() {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "Skipping event");
                summary.failed += 1;
                return Ok(());
            }
        };

        let uuid = event.uuid.clone();
        match self.client.insert_event(event).await {
            Ok(response) if response.status.success => {
                match response.status.message.as_str() {
                    "inserted" => summary.inserted += 1,
                    "updated" => summary.updated += 1,
                    _ => summary.unchanged += 1,
                }
                debug!(%uuid, outcome = %response.status.message, "Event stored");
            }
            Ok(response) => {
                warn!(%uuid, message = %response.status.message, "Server refused event");
                summary.failed += 1;
            }
            Err(err @ ImportError::Login { .. }) => return Err(err),
            Err(err) => {
                warn!(%uuid, error = %err, "Failed to add event");
                summary.failed += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use eventshub_core::{Moment, Source};
    use tempfile::TempDir;

    use super::*;
    use crate::config::ImportCredentials;
    use crate::testing::TestServer;

    const FIRST: &str = r#"<root>
  <event ver="1.1.1" uuid="abc" start="2024-02-13 09:00" end="2024-02-13 09:30"
         remind="15" done="No" urgent="No" important="Yes"
         title="Standup" address="Room 1" info=""/>
  <event ver="1.1.1" uuid="def" start="2024-07-01 12:00" end="2024-07-01 13:00"
         remind="0" done="Yes" urgent="No" important="No"
         title="Lunch" address="" info=""/>
</root>"#;

    const SECOND: &str = r#"<root>
  <event ver="1.1.1" uuid="ghi" start="not a date" end="2024-02-14 10:00"
         remind="0" done="No" urgent="No" important="No" title="Broken"/>
  <event ver="1.1.2" uuid="abc" start="2024-02-13 09:00" end="2024-02-13 09:45"
         remind="15" done="No" urgent="No" important="Yes"
         title="Standup (long)" address="Room 1" info=""/>
</root>"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn imports_files_in_order() {
        let server = TestServer::start(Duration::from_secs(60)).await;
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write(dir.path(), "first.xml", FIRST),
            write(dir.path(), "second.xml", SECOND),
        ];

        let client = EventsHubClient::new(&server.config, server.credentials()).unwrap();
        let mut importer = Importer::new(client);
        let summary = importer.import_files(&paths).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                submitted: 4,
                inserted: 2,
                updated: 1,
                unchanged: 0,
                failed: 1,
            }
        );
        assert_eq!(summary.succeeded(), 3);
        assert!(!summary.is_clean());

        let standup = server.repository.get_by_uuid("abc").unwrap().unwrap();
        assert_eq!(standup.title, "Standup (long)");
        assert_eq!(standup.end, Moment::new(2024, 2, 13, 9, 45));
        assert_eq!(standup.source, Source::Xml);
        assert!(server.repository.get_by_uuid("ghi").unwrap().is_none());

        let summary = importer.import_files(&paths[1..]).await.unwrap();
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.inserted + summary.updated, 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn broken_file_uploads_nothing() {
        let server = TestServer::start(Duration::from_secs(60)).await;
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write(dir.path(), "first.xml", FIRST),
            dir.path().join("missing.xml"),
        ];

        let client = EventsHubClient::new(&server.config, server.credentials()).unwrap();
        let err = Importer::new(client).import_files(&paths).await.unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
        assert!(server.repository.all_events().unwrap().is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn bad_credentials_abort() {
        let server = TestServer::start(Duration::from_secs(60)).await;
        let dir = TempDir::new().unwrap();
        let paths = vec![write(dir.path(), "first.xml", FIRST)];

        let client =
            EventsHubClient::new(&server.config, ImportCredentials::new("admin", "nope")).unwrap();
        let err = Importer::new(client).import_files(&paths).await.unwrap_err();
        assert!(matches!(err, ImportError::Login { status: 401 }));

        server.stop().await;
    }

    #[test]
    fn summary_display() {
        let summary = ImportSummary {
            submitted: 3,
            inserted: 1,
            updated: 1,
            unchanged: 0,
            failed: 1,
        };
        assert_eq!(
            summary.to_string(),
            "3 submitted: 1 inserted, 1 updated, 0 unchanged, 1 failed"
        );
    }
}
