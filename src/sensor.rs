//! Home-automation sensor state on top of the portal client.

use chrono::NaiveDate;

use crate::{
    api::edistribucion::{Api, BreakerState, Contract},
    period::{HistoryWindow, is_new_period},
    prelude::*,
    quantity::{energy::KilowattHours, percent::Percent, power::Kilowatts},
};

/// Totals which are requested once per calendar day.
#[must_use]
#[derive(Clone, Debug)]
pub struct History {
    pub yesterday: KilowattHours,
    pub last_7_days: KilowattHours,
    pub last_30_days: KilowattHours,

    /// Maximeter peak over the last year and a month.
    pub max_power: Kilowatts,
}

#[must_use]
#[derive(Clone, Debug)]
pub struct SensorState {
    /// Current power draw, which is the sensor value.
    pub power: Option<Kilowatts>,

    pub supply_point: String,
    pub breaker: Option<BreakerState>,
    pub totalizer: KilowattHours,
    pub load: Option<Percent>,
    pub contracted_power: Option<Kilowatts>,

    /// Consumption since the first poll of the day.
    pub today: KilowattHours,

    pub history: Option<History>,
}

#[derive(Default)]
pub struct Sensor {
    last_poll_date: Option<NaiveDate>,

    /// Totalizer at the first poll of the day.
    baseline: Option<KilowattHours>,

    history: Option<History>,
    state: Option<SensorState>,
}

impl Sensor {
    pub const fn state(&self) -> Option<&SensorState> {
        self.state.as_ref()
    }

    /// Run one poll cycle.
    ///
    /// Nothing is updated unless the whole cycle succeeds.
    #[instrument(skip_all, fields(today = %today))]
    pub async fn update(&mut self, api: &Api, today: NaiveDate) -> Result<&SensorState> {
        let contract = api.primary_contract().await?;

        let history = if is_new_period(self.last_poll_date, today) {
            info!("new day, fetching the history…");
            Some(fetch_history(api, &contract, HistoryWindow::anchored_at(today)).await?)
        } else {
            None
        };
        let meter = api.get_meter(&contract).await?;

        if let Some(history) = history {
            self.history = Some(history);
            self.baseline = Some(meter.totalizer);
        }
        self.last_poll_date = Some(today);
        let baseline = self.baseline.unwrap_or(meter.totalizer);

        let state = SensorState {
            power: meter.current_power,
            supply_point: contract
                .label
                .clone()
                .unwrap_or_else(|| contract.supply_point().to_owned()),
            breaker: meter.breaker,
            totalizer: meter.totalizer,
            load: meter.load,
            contracted_power: meter.contracted_power,
            today: meter.totalizer - baseline,
            history: self.history.clone(),
        };
        Ok(&*self.state.insert(state))
    }
}

async fn fetch_history(api: &Api, contract: &Contract, window: HistoryWindow) -> Result<History> {
    let yesterday = api.get_day_curve(contract, window.yesterday).await?;
    let last_7_days = api.get_week_curve(contract, window.week_start).await?;
    let last_30_days = api.get_month_curve(contract, window.month_start).await?;
    let maximeter = api
        .get_year_maximeter(contract.supply_point(), window.maximeter_from, window.maximeter_to)
        .await?;
    Ok(History {
        yesterday: yesterday.total,
        last_7_days: last_7_days.total,
        last_30_days: last_30_days.total,
        max_power: maximeter.peak,
    })
}
