use std::time::Duration;

use bon::Builder;
use chrono::Local;
use clap::Parser;
use reqwest::Url;
use tokio::time::{MissedTickBehavior, interval};

use crate::{
    api::{
        edistribucion::{self, Api, ClientState},
        heartbeat::Heartbeat,
    },
    prelude::*,
    sensor::Sensor,
};

#[derive(Parser)]
pub struct WatchArgs {
    #[clap(long, env = "POLLING_INTERVAL", default_value = "10min")]
    interval: humantime::Duration,

    #[clap(long = "heartbeat-url", env = "HEARTBEAT_URL")]
    heartbeat_url: Option<Url>,
}

impl WatchArgs {
    pub async fn run(self, api: Api) -> Result {
        Watcher::builder()
            .api(api)
            .heartbeat(Heartbeat::new(self.heartbeat_url))
            .interval(self.interval)
            .build()
            .run()
            .await
    }
}

#[derive(Builder)]
struct Watcher {
    api: Api,
    heartbeat: Heartbeat,

    #[builder(into)]
    interval: Duration,
}

impl Watcher {
    async fn run(self) -> Result {
        let mut sensor = Sensor::default();
        let mut interval = interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match sensor.update(&self.api, Local::now().date_naive()).await {
                Ok(state) => {
                    info!(
                        power = ?state.power,
                        today = ?state.today,
                        totalizer = ?state.totalizer,
                        "updated",
                    );
                    self.heartbeat.send().await;
                }
                Err(error) => {
                    self.heartbeat.send_failure(&error).await;

                    // Only a new explicit login may recover from rejected credentials.
                    if self.api.state().await == ClientState::AuthFailed {
                        return Err(error.context("the portal rejected the credentials"));
                    }
                    let is_unreachable = matches!(
                        error.downcast_ref::<edistribucion::Error>(),
                        Some(edistribucion::Error::Transport { .. })
                    );
                    warn!(is_unreachable, "poll failed, keeping the previous state: {error:#}");
                }
            }
        }
    }
}
