use std::time::Duration;

use reqwest::{Client, Url};

use crate::prelude::*;

/// Liveness ping of a [healthchecks.io](https://healthchecks.io)-style monitor.
///
/// Pings are best-effort: a failure to deliver one only gets logged.
pub struct Heartbeat(Option<Url>);

impl Heartbeat {
    pub const fn new(url: Option<Url>) -> Self {
        Self(url)
    }

    /// Report a successful poll.
    pub async fn send(&self) {
        if let Some(url) = &self.0
            && let Err(error) = Self::post(url.clone(), String::new()).await
        {
            warn!("failed to send the heartbeat: {error:#}");
        }
    }

    /// Report a failed poll to the `/fail` endpoint of the check, with the error as the body.
    pub async fn send_failure(&self, error: &Error) {
        let Some(url) = &self.0 else {
            return;
        };
        let result = match fail_url(url) {
            Ok(url) => Self::post(url, format!("{error:#}")).await,
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            warn!("failed to report the failure: {error:#}");
        }
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn post(url: Url, body: String) -> Result {
        info!("sending a heartbeat…");
        Client::builder()
            .timeout(Duration::from_secs(3))
            .build()?
            .post(url)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn fail_url(url: &Url) -> Result<Url> {
    let mut url = url.clone();
    url.path_segments_mut()
        .map_err(|()| anyhow!("the heartbeat URL cannot be a base"))?
        .pop_if_empty()
        .push("fail");
    Ok(url)
}
