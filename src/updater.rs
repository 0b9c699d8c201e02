//! Self-update against a remote version manifest.
//!
//! Runs once at startup, before the platform session. Every failure on this
//! path is absorbed: the bot keeps running on its last-known-good build and
//! tries again on the next restart. Only a completed install asks the process
//! to exit, so the external supervisor can relaunch the new build.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::fsio::write_atomic;
use crate::manifest::VersionManifest;
use crate::version_source::{self, VersionSource};

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("update payload from {url} is empty")]
    EmptyPayload { url: String },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("cannot locate installed build: {0}")]
    InstalledPath(std::io::Error),
}

/// Raw result of a GET.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, UpdateError>;
}

/// reqwest-backed fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("premade-bots/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpdateError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, UpdateError> {
        let transport = |e: reqwest::Error| UpdateError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport)?.to_vec();
        Ok(FetchResponse { status, body })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// No manifest or payload URL configured.
    NotConfigured,
    VersionUnreadable(String),
    ManifestUnavailable(String),
    NotListed,
}

/// How a check ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate { version: String },
    Skipped(SkipReason),
    /// The transition failed part way; the previous build stays authoritative.
    Aborted(String),
    Installed { from: String, to: String },
}

impl UpdateOutcome {
    /// Exit code the process should terminate with, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            UpdateOutcome::Installed { .. } => Some(0),
            _ => None,
        }
    }
}

pub struct UpdateSupervisor {
    identifier: String,
    manifest_url: String,
    update_url: String,
    installed_path: PathBuf,
    version_source: Box<dyn VersionSource>,
    fetcher: Box<dyn Fetcher>,
    /// Set when the check must not run at all.
    gate: Option<SkipReason>,
}

impl UpdateSupervisor {
    pub fn new(
        identifier: impl Into<String>,
        manifest_url: impl Into<String>,
        update_url: impl Into<String>,
        installed_path: impl Into<PathBuf>,
        version_source: Box<dyn VersionSource>,
        fetcher: Box<dyn Fetcher>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            manifest_url: manifest_url.into(),
            update_url: update_url.into(),
            installed_path: installed_path.into(),
            version_source,
            fetcher,
            gate: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, UpdateError> {
        let installed_path = match &config.update.installed_path {
            Some(p) => p.clone(),
            None => std::env::current_exe().map_err(UpdateError::InstalledPath)?,
        };
        let source = version_source::from_config(&config.update.version_source, &installed_path);
        let fetcher = HttpFetcher::new(Duration::from_secs(config.update.timeout_secs))?;
        let urls = config.update.manifest_url.clone().zip(config.update_url());
        let gate = if !config.update.enabled {
            Some(SkipReason::Disabled)
        } else if urls.is_none() {
            Some(SkipReason::NotConfigured)
        } else {
            None
        };
        let (manifest_url, update_url) = urls.unwrap_or_default();
        let mut supervisor = Self::new(
            config.identifier(),
            manifest_url,
            update_url,
            installed_path,
            source,
            Box::new(fetcher),
        );
        supervisor.gate = gate;
        Ok(supervisor)
    }

    pub fn disabled(mut self) -> Self {
        self.gate = Some(SkipReason::Disabled);
        self
    }

    pub fn installed_path(&self) -> &Path {
        &self.installed_path
    }

    /// Compare the local build with the manifest and install a new build when
    /// the published version differs.
    pub async fn check(&self) -> UpdateOutcome {
        match &self.gate {
            Some(SkipReason::NotConfigured) => {
                info!("self-update not configured, set update.manifest_url and update.update_url");
                return UpdateOutcome::Skipped(SkipReason::NotConfigured);
            }
            Some(reason) => {
                info!("self-update disabled");
                return UpdateOutcome::Skipped(reason.clone());
            }
            None => {}
        }

        let local = match self.version_source.read() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "cannot read local version, skipping update check");
                return UpdateOutcome::Skipped(SkipReason::VersionUnreadable(e.to_string()));
            }
        };

        let manifest = match self.fetch_manifest().await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to check for updates");
                return UpdateOutcome::Skipped(SkipReason::ManifestUnavailable(e.to_string()));
            }
        };

        let published = match manifest.version_for(&self.identifier) {
            Some(v) => v.to_string(),
            None => {
                warn!(identifier = %self.identifier, "bot identifier not found in versions file");
                return UpdateOutcome::Skipped(SkipReason::NotListed);
            }
        };

        info!(
            identifier = %self.identifier,
            source = %self.version_source.describe(),
            local = %local,
            published = %published,
            "version check"
        );

        // Any difference counts, including downgrades.
        if published == local {
            info!(version = %local, "running latest version");
            return UpdateOutcome::UpToDate { version: local };
        }

        info!(from = %local, to = %published, "update available, downloading");
        match self.install(&published).await {
            Ok(()) => {
                info!(
                    from = %local,
                    to = %published,
                    path = %self.installed_path.display(),
                    "update complete, restart required"
                );
                UpdateOutcome::Installed {
                    from: local,
                    to: published,
                }
            }
            Err(e) => {
                error!(error = %e, "update failed, continuing on current build");
                UpdateOutcome::Aborted(e.to_string())
            }
        }
    }

    async fn fetch_manifest(&self) -> Result<VersionManifest, UpdateError> {
        let response = self.fetcher.get(&self.manifest_url).await?;
        if !response.is_success() {
            return Err(UpdateError::Status {
                url: self.manifest_url.clone(),
                status: response.status,
            });
        }
        Ok(VersionManifest::parse(&String::from_utf8_lossy(&response.body)))
    }

    /// Fetch, replace, record. The rename is the commit point: once the new
    /// build is in place the install counts as done even if a separate
    /// record write fails, which only makes the next start reinstall.
    async fn install(&self, version: &str) -> Result<(), UpdateError> {
        let response = self.fetcher.get(&self.update_url).await?;
        if !response.is_success() {
            return Err(UpdateError::Status {
                url: self.update_url.clone(),
                status: response.status,
            });
        }
        if response.body.is_empty() {
            return Err(UpdateError::EmptyPayload {
                url: self.update_url.clone(),
            });
        }

        let stamped = self
            .version_source
            .stamp(&self.installed_path, &response.body, version);
        let payload = stamped.as_deref().unwrap_or(&response.body[..]);
        write_atomic(&self.installed_path, payload).map_err(|source| UpdateError::Write {
            path: self.installed_path.clone(),
            source,
        })?;

        if stamped.is_none() {
            if let Err(e) = self.version_source.write(version) {
                warn!(
                    error = %e,
                    source = %self.version_source.describe(),
                    "new build installed but version record is stale"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version_source::{EmbeddedVersion, InlineMarker, SidecarFile};
    use std::fs;
    use tempfile::tempdir;

    const MANIFEST_URL: &str = "https://updates.test/versions.txt";
    const UPDATE_URL: &str = "https://updates.test/moderation-bot.js";
    const MANIFEST: &str = "moderation-bot.js==1.0.2\nwelcome-bot.js==1.0.5\n";

    fn ok(body: &str) -> Result<FetchResponse, UpdateError> {
        Ok(FetchResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
        })
    }

    fn supervisor(
        installed: &Path,
        source: Box<dyn VersionSource>,
        fetcher: MockFetcher,
    ) -> UpdateSupervisor {
        UpdateSupervisor::new(
            "moderation-bot.js",
            MANIFEST_URL,
            UPDATE_URL,
            installed,
            source,
            Box::new(fetcher),
        )
    }

    #[tokio::test]
    async fn test_equal_version_no_download_no_write() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("moderation-bot.js");
        fs::write(&installed, "old build").unwrap();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .withf(|url| url == MANIFEST_URL)
            .times(1)
            .returning(|_| ok(MANIFEST));
        fetcher
            .expect_get()
            .withf(|url| url == UPDATE_URL)
            .times(0);

        let sup = supervisor(&installed, Box::new(EmbeddedVersion::new("1.0.2")), fetcher);
        let outcome = sup.check().await;

        assert_eq!(
            outcome,
            UpdateOutcome::UpToDate {
                version: "1.0.2".to_string()
            }
        );
        assert_eq!(outcome.exit_code(), None);
        assert_eq!(fs::read_to_string(&installed).unwrap(), "old build");
    }

    #[tokio::test]
    async fn test_different_version_installs_and_records() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("moderation-bot.js");
        let sidecar = dir.path().join("version.txt");
        fs::write(&installed, "old build").unwrap();
        fs::write(&sidecar, "1.0.1").unwrap();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .withf(|url| url == MANIFEST_URL)
            .times(1)
            .returning(|_| ok(MANIFEST));
        fetcher
            .expect_get()
            .withf(|url| url == UPDATE_URL)
            .times(1)
            .returning(|_| ok("new build"));

        let sup = supervisor(&installed, Box::new(SidecarFile::new(&sidecar)), fetcher);
        let outcome = sup.check().await;

        assert_eq!(
            outcome,
            UpdateOutcome::Installed {
                from: "1.0.1".to_string(),
                to: "1.0.2".to_string()
            }
        );
        assert_eq!(outcome.exit_code(), Some(0));
        assert_eq!(fs::read_to_string(&installed).unwrap(), "new build");
        assert_eq!(fs::read_to_string(&sidecar).unwrap(), "1.0.2");
    }

    #[tokio::test]
    async fn test_downgrade_counts_as_update() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("bot");

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .withf(|url| url == MANIFEST_URL)
            .returning(|_| ok("moderation-bot.js==0.9.0\n"));
        fetcher
            .expect_get()
            .withf(|url| url == UPDATE_URL)
            .times(1)
            .returning(|_| ok("older build"));

        let sup = supervisor(&installed, Box::new(EmbeddedVersion::new("1.0.0")), fetcher);
        assert!(matches!(sup.check().await, UpdateOutcome::Installed { .. }));
    }

    #[tokio::test]
    async fn test_missing_entry_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("bot");
        fs::write(&installed, "old build").unwrap();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .times(1)
            .returning(|_| ok("welcome-bot.js==1.0.5\n"));

        let sup = supervisor(&installed, Box::new(EmbeddedVersion::new("1.0.1")), fetcher);
        assert_eq!(sup.check().await, UpdateOutcome::Skipped(SkipReason::NotListed));
        assert_eq!(fs::read_to_string(&installed).unwrap(), "old build");
    }

    #[tokio::test]
    async fn test_manifest_bad_status_is_non_fatal() {
        let dir = tempdir().unwrap();
        let mut fetcher = MockFetcher::new();
        fetcher.expect_get().times(1).returning(|_| {
            Ok(FetchResponse {
                status: 404,
                body: Vec::new(),
            })
        });

        let sup = supervisor(
            &dir.path().join("bot"),
            Box::new(EmbeddedVersion::new("1.0.1")),
            fetcher,
        );
        let outcome = sup.check().await;
        assert!(matches!(
            outcome,
            UpdateOutcome::Skipped(SkipReason::ManifestUnavailable(_))
        ));
        assert_eq!(outcome.exit_code(), None);
    }

    #[tokio::test]
    async fn test_manifest_transport_error_is_non_fatal() {
        let dir = tempdir().unwrap();
        let mut fetcher = MockFetcher::new();
        fetcher.expect_get().times(1).returning(|url| {
            Err(UpdateError::Transport {
                url: url.to_string(),
                reason: "dns failure".to_string(),
            })
        });

        let sup = supervisor(
            &dir.path().join("bot"),
            Box::new(EmbeddedVersion::new("1.0.1")),
            fetcher,
        );
        assert!(matches!(
            sup.check().await,
            UpdateOutcome::Skipped(SkipReason::ManifestUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_payload_failure_keeps_old_build() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("bot");
        let sidecar = dir.path().join("version.txt");
        fs::write(&installed, "old build").unwrap();
        fs::write(&sidecar, "1.0.1").unwrap();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .withf(|url| url == MANIFEST_URL)
            .returning(|_| ok(MANIFEST));
        fetcher
            .expect_get()
            .withf(|url| url == UPDATE_URL)
            .times(1)
            .returning(|_| {
                Ok(FetchResponse {
                    status: 500,
                    body: b"oops".to_vec(),
                })
            });

        let sup = supervisor(&installed, Box::new(SidecarFile::new(&sidecar)), fetcher);
        let outcome = sup.check().await;
        assert!(matches!(outcome, UpdateOutcome::Aborted(_)));
        assert_eq!(outcome.exit_code(), None);
        assert_eq!(fs::read_to_string(&installed).unwrap(), "old build");
        assert_eq!(fs::read_to_string(&sidecar).unwrap(), "1.0.1");
    }

    #[tokio::test]
    async fn test_empty_payload_rejected() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("bot");
        fs::write(&installed, "old build").unwrap();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .withf(|url| url == MANIFEST_URL)
            .returning(|_| ok(MANIFEST));
        fetcher
            .expect_get()
            .withf(|url| url == UPDATE_URL)
            .returning(|_| ok(""));

        let sup = supervisor(&installed, Box::new(EmbeddedVersion::new("1.0.1")), fetcher);
        assert!(matches!(sup.check().await, UpdateOutcome::Aborted(_)));
        assert_eq!(fs::read_to_string(&installed).unwrap(), "old build");
    }

    #[tokio::test]
    async fn test_write_failure_aborts_without_recording() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("missing-dir").join("bot");
        let sidecar = dir.path().join("version.txt");
        fs::write(&sidecar, "1.0.1").unwrap();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .withf(|url| url == MANIFEST_URL)
            .returning(|_| ok(MANIFEST));
        fetcher
            .expect_get()
            .withf(|url| url == UPDATE_URL)
            .returning(|_| ok("new build"));

        let sup = supervisor(&installed, Box::new(SidecarFile::new(&sidecar)), fetcher);
        assert!(matches!(sup.check().await, UpdateOutcome::Aborted(_)));
        assert_eq!(fs::read_to_string(&sidecar).unwrap(), "1.0.1");
    }

    #[tokio::test]
    async fn test_record_failure_after_install_still_installed() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("bot");
        let sidecar = dir.path().join("missing-dir").join("version.txt");
        fs::write(&installed, "old build").unwrap();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .withf(|url| url == MANIFEST_URL)
            .returning(|_| ok(MANIFEST));
        fetcher
            .expect_get()
            .withf(|url| url == UPDATE_URL)
            .times(1)
            .returning(|_| ok("new build"));

        let sup = supervisor(&installed, Box::new(SidecarFile::new(&sidecar)), fetcher);
        let outcome = sup.check().await;
        assert_eq!(
            outcome,
            UpdateOutcome::Installed {
                from: "0.0.0".to_string(),
                to: "1.0.2".to_string()
            }
        );
        assert_eq!(outcome.exit_code(), Some(0));
        assert_eq!(fs::read_to_string(&installed).unwrap(), "new build");
        assert!(!sidecar.exists());
    }

    #[tokio::test]
    async fn test_marker_is_stamped_into_payload() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("moderation-bot.js");
        fs::write(&installed, "// @version 1.0.1\nold();\n").unwrap();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .withf(|url| url == MANIFEST_URL)
            .returning(|_| ok(MANIFEST));
        fetcher
            .expect_get()
            .withf(|url| url == UPDATE_URL)
            .returning(|_| ok("new();\n"));

        let sup = supervisor(&installed, Box::new(InlineMarker::new(&installed)), fetcher);
        assert!(matches!(sup.check().await, UpdateOutcome::Installed { .. }));
        assert_eq!(
            fs::read_to_string(&installed).unwrap(),
            "// @version 1.0.2\nnew();\n"
        );
    }

    #[tokio::test]
    async fn test_binary_payload_with_marker_source_still_installed() {
        let dir = tempdir().unwrap();
        let installed = dir.path().join("bot");
        fs::write(&installed, "// @version 1.0.1\n").unwrap();
        let binary = vec![0x7f, b'E', b'L', b'F', 0xff, 0xfe, 0x00];
        let payload = binary.clone();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_get()
            .withf(|url| url == MANIFEST_URL)
            .returning(|_| ok(MANIFEST));
        fetcher
            .expect_get()
            .withf(|url| url == UPDATE_URL)
            .returning(move |_| {
                Ok(FetchResponse {
                    status: 200,
                    body: payload.clone(),
                })
            });

        let sup = supervisor(&installed, Box::new(InlineMarker::new(&installed)), fetcher);
        let outcome = sup.check().await;
        assert_eq!(outcome.exit_code(), Some(0));
        assert_eq!(fs::read(&installed).unwrap(), binary);
    }

    #[tokio::test]
    async fn test_disabled_makes_no_requests() {
        let dir = tempdir().unwrap();
        let mut fetcher = MockFetcher::new();
        fetcher.expect_get().times(0);

        let sup = supervisor(
            &dir.path().join("bot"),
            Box::new(EmbeddedVersion::new("1.0.1")),
            fetcher,
        )
        .disabled();
        assert_eq!(sup.check().await, UpdateOutcome::Skipped(SkipReason::Disabled));
    }

    #[tokio::test]
    async fn test_http_fetcher_against_server() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/versions.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/moderation-bot.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("// @version 1.0.2\nnew();\n"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let installed = dir.path().join("moderation-bot.js");
        fs::write(&installed, "// @version 1.0.1\nold();\n").unwrap();

        let sup = UpdateSupervisor::new(
            "moderation-bot.js",
            format!("{}/versions.txt", server.uri()),
            format!("{}/moderation-bot.js", server.uri()),
            &installed,
            Box::new(InlineMarker::new(&installed)),
            Box::new(HttpFetcher::new(Duration::from_secs(5)).unwrap()),
        );

        let outcome = sup.check().await;
        assert_eq!(outcome.exit_code(), Some(0));
        assert_eq!(
            fs::read_to_string(&installed).unwrap(),
            "// @version 1.0.2\nnew();\n"
        );
    }

    #[tokio::test]
    async fn test_http_fetcher_reports_status() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let response = fetcher.get(&format!("{}/versions.txt", server.uri())).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }

    #[test]
    fn test_from_config_respects_enabled_flag() {
        let dir = tempdir().unwrap();
        let mut config = Config::default_for(crate::config::BotKind::Moderation);
        config.update.enabled = false;
        config.update.installed_path = Some(dir.path().join("bot"));

        let sup = UpdateSupervisor::from_config(&config).unwrap();
        assert_eq!(sup.installed_path(), dir.path().join("bot"));
        let outcome = tokio_test::block_on(sup.check());
        assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::Disabled));
    }

    #[test]
    fn test_default_config_does_not_self_update() {
        let config = Config::default_for(crate::config::BotKind::Moderation);
        assert!(config.update.enabled);

        let sup = UpdateSupervisor::from_config(&config).unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(sup.installed_path(), exe.as_path());
        let before = fs::metadata(&exe).unwrap().len();

        let outcome = tokio_test::block_on(sup.check());
        assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::NotConfigured));
        assert_eq!(outcome.exit_code(), None);
        assert_eq!(fs::metadata(&exe).unwrap().len(), before);
    }

    #[test]
    fn test_from_config_needs_both_urls() {
        let dir = tempdir().unwrap();
        let mut config = Config::default_for(crate::config::BotKind::Welcome);
        config.update.installed_path = Some(dir.path().join("bot"));
        config.update.manifest_url = Some("https://updates.test/versions.txt".to_string());

        let sup = UpdateSupervisor::from_config(&config).unwrap();
        let outcome = tokio_test::block_on(sup.check());
        assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::NotConfigured));
    }
}
