use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::RacewalkError;

use super::event::Event;

/// Delivers a batch of events to the race server.
///
/// Implementations return the ids the server accepted. Any transport problem,
/// including an unreadable acknowledgement, is an error and must leave the
/// caller free to retry the whole batch.
pub trait EventTransport: Send + Sync {
    fn post_batch(&self, batch: &[Event]) -> Result<Vec<u64>, RacewalkError>;
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    events: &'a [Event],
}

#[derive(Deserialize)]
struct UploadResponse {
    accepted: Vec<u64>,
}

/// Posts `{"events": [...]}` as JSON and reads `{"accepted": [...]}` back
pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl EventTransport for HttpTransport {
    fn post_batch(&self, batch: &[Event]) -> Result<Vec<u64>, RacewalkError> {
        debug!("Posting {} events to {}", batch.len(), self.url);
        let response = match self
            .agent
            .post(&self.url)
            .send_json(UploadRequest { events: batch })
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(RacewalkError::UploadRejected { status });
            }
            Err(e) => {
                return Err(RacewalkError::Transport {
                    url: self.url.clone(),
                    source: Box::new(e),
                });
            }
        };

        let acknowledgement: UploadResponse = response
            .into_json()
            .map_err(|e| RacewalkError::MalformedAcknowledgement { source: e })?;
        Ok(acknowledgement.accepted)
    }
}
