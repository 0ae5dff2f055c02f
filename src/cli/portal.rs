use clap::Parser;
use reqwest::Url;

use crate::{
    api::edistribucion::{Api, ClientConfig, Credentials, DEFAULT_BASE_URL},
    prelude::*,
};

#[derive(Parser)]
pub struct PortalArgs {
    /// Portal username, usually the NIF.
    #[clap(long = "username", env = "EDISTRIBUCION_USERNAME")]
    username: String,

    #[clap(long = "password", env = "EDISTRIBUCION_PASSWORD", hide_env_values = true)]
    password: String,

    #[clap(long = "base-url", env = "EDISTRIBUCION_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: Url,

    /// Timeout of a single portal request.
    #[clap(long = "timeout", env = "EDISTRIBUCION_TIMEOUT", default_value = "30s")]
    timeout: humantime::Duration,
}

impl PortalArgs {
    fn credentials(&self) -> Credentials {
        Credentials { username: self.username.clone(), password: self.password.clone() }
    }

    /// Create the client and log in.
    pub async fn connect(&self) -> Result<Api> {
        let api = Api::new(
            ClientConfig::builder()
                .base_url(self.base_url.clone())
                .timeout(self.timeout.into())
                .build(),
        )?;
        api.login(self.credentials()).await.context("failed to log into the portal")?;
        Ok(api)
    }
}
