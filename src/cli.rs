mod portal;
mod watch;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

pub use self::{portal::PortalArgs, watch::WatchArgs};
use crate::{api::edistribucion::CurvePeriod, period::YearMonth};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub portal: PortalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll the meter once and print the sensor state.
    #[clap(name = "poll")]
    Poll,

    /// Keep polling the meter on a fixed interval.
    #[clap(name = "watch")]
    Watch(WatchArgs),

    /// List the supply contracts of the account.
    #[clap(name = "contracts")]
    Contracts,

    /// Read the meter of the primary contract.
    #[clap(name = "meter")]
    Meter,

    /// Print a consumption curve of the primary contract.
    #[clap(name = "curve")]
    Curve(CurveArgs),

    /// Print the maximeter histogram of the primary contract.
    #[clap(name = "maximeter")]
    Maximeter(MaximeterArgs),

    /// Ask the portal to close the supply breaker again.
    #[clap(name = "reconnect-breaker")]
    ReconnectBreaker,
}

#[derive(Parser)]
pub struct CurveArgs {
    #[clap(long, value_enum, default_value = "day")]
    pub period: CurvePeriod,

    /// First day of the period, yesterday by default.
    #[clap(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Parser)]
pub struct MaximeterArgs {
    /// First month as `MM/YYYY` or `YYYY-MM`, a year and a month ago by default.
    #[clap(long)]
    pub from: Option<YearMonth>,

    /// Last month, the current one by default.
    #[clap(long)]
    pub to: Option<YearMonth>,
}
