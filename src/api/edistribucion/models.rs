use std::fmt::{Display, Formatter};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use super::{
    endpoint::CurvePeriod,
    error::{Error, Result},
    numeric::Numeric,
};
use crate::{
    period::YearMonth,
    quantity::{energy::KilowattHours, percent::Percent, power::Kilowatts},
};

/// Every return value wraps its payload into `data`.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<serde_json::Value>,

    #[serde(default)]
    success: Option<bool>,

    #[serde(default)]
    message: Option<String>,
}

/// Decode the action return value, failing closed on required fields.
pub fn decode<T: DeserializeOwned>(
    operation: &'static str,
    return_value: serde_json::Value,
) -> Result<T> {
    let envelope = match Envelope::deserialize(&return_value) {
        Ok(envelope) => envelope,
        Err(error) => return Err(Error::decode(operation, error, &return_value)),
    };
    if envelope.success == Some(false) {
        let message = envelope.message.unwrap_or_else(|| String::from("the portal declined"));
        return Err(Error::Portal { operation, message });
    }
    let Some(data) = envelope.data else {
        return Err(Error::decode(operation, "missing field `data`", &return_value));
    };
    T::deserialize(&data).map_err(|error| Error::decode(operation, error, &return_value))
}

/// Electricity supply contract.
#[must_use]
#[derive(Clone, Debug, Deserialize)]
pub struct Contract {
    #[serde(rename = "Id")]
    pub id: String,

    /// CUPS identifier, when listed.
    #[serde(rename = "CUPS_Id", default)]
    pub supply_point_id: Option<String>,

    /// Human-readable CUPS.
    #[serde(rename = "CUPS", default)]
    pub label: Option<String>,
}

impl Contract {
    /// Key for the meter, breaker, and maximeter endpoints.
    ///
    /// Listings without `CUPS_Id` address the supply point by the contract ID.
    pub fn supply_point(&self) -> &str {
        self.supply_point_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Deserialize)]
pub struct ContractList {
    #[serde(rename = "lstCups")]
    pub contracts: Vec<Contract>,
}

#[must_use]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BreakerState {
    /// Supply is on.
    Closed,

    /// Tripped or disconnected.
    Open,

    Other(String),
}

impl<'de> Deserialize<'de> for BreakerState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let state = String::deserialize(deserializer)?;
        let normalized = state.to_lowercase();
        if ["desconect", "abierto", "open"].iter().any(|needle| normalized.contains(needle)) {
            Ok(Self::Open)
        } else if ["conect", "cerrado", "closed"].iter().any(|needle| normalized.contains(needle))
        {
            Ok(Self::Closed)
        } else {
            Ok(Self::Other(state))
        }
    }
}

impl Display for BreakerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::Other(state) => write!(f, "{state}"),
        }
    }
}

/// Instant meter reading.
#[must_use]
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct MeterSnapshot {
    /// Lifetime energy counter.
    #[serde_as(as = "Numeric")]
    #[serde(rename = "totalizador")]
    pub totalizer: KilowattHours,

    #[serde_as(as = "Option<Numeric>")]
    #[serde(rename = "potenciaActual")]
    pub current_power: Option<Kilowatts>,

    #[serde_as(as = "Option<Numeric>")]
    #[serde(rename = "potenciaContratada")]
    pub contracted_power: Option<Kilowatts>,

    /// Current power relative to the contracted power.
    #[serde_as(as = "Option<Numeric>")]
    #[serde(rename = "percent")]
    pub load: Option<Percent>,

    #[serde(rename = "estadoICP", default)]
    pub breaker: Option<BreakerState>,
}

#[must_use]
#[derive(Clone, Debug)]
pub struct ConsumptionCurve {
    pub period: CurvePeriod,
    pub start_date: NaiveDate,
    pub total: KilowattHours,
    pub buckets: Vec<CurveBucket>,
}

#[must_use]
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct CurveBucket {
    #[serde(default)]
    pub date: Option<String>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub hour: Option<u32>,

    /// Unset for the buckets which the meter has not reported yet.
    #[serde_as(as = "Option<Numeric>")]
    pub value: Option<KilowattHours>,
}

impl CurveBucket {
    pub fn label(&self) -> String {
        match (&self.date, self.hour) {
            (Some(date), Some(hour)) => format!("{date} {hour:02}h"),
            (Some(date), None) => date.clone(),
            (None, Some(hour)) => format!("{hour:02}h"),
            (None, None) => String::from("?"),
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
pub struct CurveData {
    #[serde_as(as = "Numeric")]
    #[serde(rename = "totalValue")]
    pub total: KilowattHours,

    #[serde(default)]
    pub points: Vec<CurveBucket>,
}

impl CurveData {
    pub fn into_curve(self, period: CurvePeriod, start_date: NaiveDate) -> ConsumptionCurve {
        ConsumptionCurve { period, start_date, total: self.total, buckets: self.points }
    }
}

#[must_use]
#[derive(Clone, Debug)]
pub struct MaximeterHistogram {
    pub from: YearMonth,
    pub to: YearMonth,

    /// Highest power registered over the whole range.
    pub peak: Kilowatts,

    pub readings: Vec<MaximeterReading>,
}

#[must_use]
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct MaximeterReading {
    #[serde(default)]
    pub date: Option<String>,

    #[serde_as(as = "Option<Numeric>")]
    pub value: Option<Kilowatts>,
}

#[serde_as]
#[derive(Deserialize)]
pub struct MaximeterData {
    #[serde_as(as = "Numeric")]
    #[serde(rename = "maxValue")]
    pub peak: Kilowatts,

    #[serde(rename = "lstData", default)]
    pub readings: Vec<MaximeterReading>,
}

impl MaximeterData {
    pub fn into_histogram(self, from: YearMonth, to: YearMonth) -> MaximeterHistogram {
        MaximeterHistogram { from, to, peak: self.peak, readings: self.readings }
    }
}

/// Portal acknowledgement of a breaker reconnection request.
#[must_use]
#[derive(Clone, Debug, Deserialize)]
pub struct BreakerReconnection {
    #[serde(rename = "resultado", default)]
    pub result: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}
