#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod cli;
mod period;
mod prelude;
mod quantity;
mod sensor;
mod tables;

use chrono::{Local, TimeDelta};
use clap::{Parser, crate_version};
use tracing_subscriber::EnvFilter;

use crate::{
    api::edistribucion::{Api, CurvePeriod},
    cli::{Args, Command, CurveArgs, MaximeterArgs},
    period::HistoryWindow,
    prelude::*,
    sensor::Sensor,
    tables::{
        build_contracts_table,
        build_curve_table,
        build_maximeter_table,
        build_meter_table,
        build_sensor_table,
    },
};

#[tokio::main]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .without_time()
        .compact()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    let api = args.portal.connect().await?;

    match args.command {
        Command::Poll => {
            let mut sensor = Sensor::default();
            let state = sensor.update(&api, Local::now().date_naive()).await?;
            println!("{}", build_sensor_table(state));
        }
        Command::Watch(args) => {
            args.run(api).await?;
        }
        Command::Contracts => {
            println!("{}", build_contracts_table(&api.list_contracts().await?));
        }
        Command::Meter => {
            let contract = api.primary_contract().await?;
            println!("{}", build_meter_table(&api.get_meter(&contract).await?));
        }
        Command::Curve(args) => {
            curve(&api, args).await?;
        }
        Command::Maximeter(args) => {
            maximeter(&api, args).await?;
        }
        Command::ReconnectBreaker => {
            let contract = api.primary_contract().await?;
            let reconnection = api.reconnect_breaker(&contract).await?;
            info!(
                supply_point = contract.supply_point(),
                result = reconnection.result.as_deref().unwrap_or("?"),
                message = reconnection.message.as_deref().unwrap_or_default(),
                "requested the reconnection",
            );
        }
    }

    info!("done!");
    Ok(())
}

async fn curve(api: &Api, args: CurveArgs) -> Result {
    let contract = api.primary_contract().await?;
    let date = args.date.unwrap_or_else(|| Local::now().date_naive() - TimeDelta::days(1));
    let curve = match args.period {
        CurvePeriod::Day => api.get_day_curve(&contract, date).await?,
        CurvePeriod::Week => api.get_week_curve(&contract, date).await?,
        CurvePeriod::Month => api.get_month_curve(&contract, date).await?,
        CurvePeriod::Year => api.get_year_curve(&contract, date).await?,
    };
    println!("{}", build_curve_table(&curve));
    Ok(())
}

async fn maximeter(api: &Api, args: MaximeterArgs) -> Result {
    let window = HistoryWindow::anchored_at(Local::now().date_naive());
    let contract = api.primary_contract().await?;
    let histogram = api
        .get_year_maximeter(
            contract.supply_point(),
            args.from.unwrap_or(window.maximeter_from),
            args.to.unwrap_or(window.maximeter_to),
        )
        .await?;
    let contracted_power = api.get_meter(&contract).await?.contracted_power;
    println!("{}", build_maximeter_table(&histogram, contracted_power));
    Ok(())
}
