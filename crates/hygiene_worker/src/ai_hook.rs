//! Stage E: a single HTTP POST to an external report-synthesis
//! service. The executor awaits only success/failure of the call — the
//! service reads artefacts from the store directly and writes `report.md`.

use hygiene_ids::JobId;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
struct SynthesizeRequest<'a> {
    job_id: &'a JobId,
    provider: &'a str,
}

/// Thin client around the AI synthesis hook URL from [`hygiene_protocol::Config`].
pub struct AiHookClient {
    http: reqwest::Client,
    url: String,
    provider: String,
}

impl AiHookClient {
    pub fn new(url: String, provider: String, timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, url, provider }
    }

    /// Invoke the hook. Errors are non-fatal to the job; the
    /// caller decides whether to record and swallow, or propagate.
    pub async fn synthesize(&self, job_id: &JobId) -> Result<()> {
        self.http
            .post(&self.url)
            .json(&SynthesizeRequest {
                job_id,
                provider: &self.provider,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
