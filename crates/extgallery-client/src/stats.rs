//! Fire-and-forget install statistics
//!
//! Reports are queued on an unbounded channel and posted by a background
//! task. Failures are logged and otherwise ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::http::{RequestOptions, RequestService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticType {
    Install,
    Uninstall,
}

impl StatisticType {
    pub fn as_str(self) -> &'static str {
        match self {
            StatisticType::Install => "install",
            StatisticType::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for StatisticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued report
#[derive(Debug, Clone)]
pub struct StatisticReport {
    pub publisher: String,
    pub name: String,
    pub version: String,
    pub statistic: StatisticType,
    pub headers: BTreeMap<String, String>,
}

impl StatisticReport {
    fn url(&self, service_url: &str) -> String {
        format!(
            "{}/publishers/{}/extensions/{}/{}/stats?statType={}",
            service_url.trim_end_matches('/'),
            self.publisher,
            self.name,
            self.version,
            self.statistic
        )
    }
}

/// Sender side of the statistics queue
#[derive(Debug)]
pub struct StatisticsReporter {
    sender: Option<mpsc::UnboundedSender<StatisticReport>>,
    worker: Option<JoinHandle<()>>,
}

impl StatisticsReporter {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// Outside a runtime the reporter is inert and drops every report.
    pub fn spawn(
        requests: Arc<dyn RequestService>,
        service_url: String,
        timeout: Duration,
    ) -> Self {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No tokio runtime, statistics disabled");
            return Self {
                sender: None,
                worker: None,
            };
        };

        let (sender, mut receiver) = mpsc::unbounded_channel::<StatisticReport>();
        let worker = handle.spawn(async move {
            let token = CancellationToken::new();
            while let Some(report) = receiver.recv().await {
                let options = RequestOptions::post(report.url(&service_url), Vec::new())
                    .with_headers(&report.headers)
                    .with_timeout(timeout);
                match requests.request(options, &token).await {
                    Ok(response) if response.is_success() => {
                        tracing::debug!(
                            "Reported {} of {}.{}@{}",
                            report.statistic,
                            report.publisher,
                            report.name,
                            report.version
                        );
                    }
                    Ok(response) => {
                        tracing::debug!(
                            "Statistics endpoint answered {} for {}.{}",
                            response.status,
                            report.publisher,
                            report.name
                        );
                    }
                    Err(e) => {
                        tracing::debug!("Failed to report statistic: {}", e);
                    }
                }
            }
        });

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Queue a report; never blocks and never fails
    pub fn report(&self, report: StatisticReport) {
        match &self.sender {
            Some(sender) => {
                if sender.send(report).is_err() {
                    tracing::debug!("Statistics worker stopped, report dropped");
                }
            }
            None => tracing::debug!("Statistics disabled, report dropped"),
        }
    }

    /// Stop accepting reports and wait until the queued ones are sent
    pub async fn close(self) {
        let Self { sender, worker } = self;
        drop(sender);
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::debug!("Statistics worker ended abnormally: {}", e);
            }
        }
    }
}
