//! Catalog of the portal actions.
//!
//! Each constructor only describes the request: authentication and retries
//! belong to the transport.

use chrono::NaiveDate;
use serde::Serialize;

use super::session::Credentials;
use crate::period::YearMonth;

const LOGIN_CONTROLLER: &str = "LightningLoginFormController";
const METER_CONTROLLER: &str = "WP_ContadorICP_F2_CTRL";
const MAXIMETER_CONTROLLER: &str = "WP_MaximeterHistogram_CTRL";

#[must_use]
pub struct Action<P> {
    /// Short operation name for logs and errors.
    pub operation: &'static str,

    controller: &'static str,
    method: &'static str,
    params: P,
}

impl<P: Serialize> Action<P> {
    pub fn descriptor(&self) -> String {
        format!("apex://{}/ACTION${}", self.controller, self.method)
    }

    /// Query parameter which names the action in the request URL.
    pub fn query_key(&self) -> String {
        format!("other.{}.{}", self.controller, self.method)
    }

    /// Aura `message` form field.
    pub fn message(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Message<'a, P> {
            actions: [ActionMessage<'a, P>; 1],
        }

        #[derive(Serialize)]
        struct ActionMessage<'a, P> {
            id: &'static str,
            descriptor: String,

            #[serde(rename = "callingDescriptor")]
            calling_descriptor: &'static str,

            params: &'a P,
        }

        serde_json::to_string(&Message {
            actions: [ActionMessage {
                id: "1;a",
                descriptor: self.descriptor(),
                calling_descriptor: "UNKNOWN",
                params: &self.params,
            }],
        })
    }
}

#[derive(Serialize)]
pub struct LoginParams<'a> {
    username: &'a str,
    password: &'a str,

    #[serde(rename = "startUrl")]
    start_url: &'static str,
}

pub fn login(credentials: &Credentials) -> Action<LoginParams<'_>> {
    Action {
        operation: "login",
        controller: LOGIN_CONTROLLER,
        method: "login",
        params: LoginParams {
            username: &credentials.username,
            password: &credentials.password,
            start_url: "/s/",
        },
    }
}

#[derive(Serialize)]
pub struct NoParams {}

pub const fn list_contracts() -> Action<NoParams> {
    Action {
        operation: "list_contracts",
        controller: METER_CONTROLLER,
        method: "getListCups",
        params: NoParams {},
    }
}

#[derive(Serialize)]
pub struct SupplyPointParams<'a> {
    #[serde(rename = "cupsId")]
    supply_point_id: &'a str,
}

pub const fn get_meter(supply_point_id: &str) -> Action<SupplyPointParams<'_>> {
    Action {
        operation: "get_meter",
        controller: METER_CONTROLLER,
        method: "consultarContador",
        params: SupplyPointParams { supply_point_id },
    }
}

pub const fn reconnect_breaker(supply_point_id: &str) -> Action<SupplyPointParams<'_>> {
    Action {
        operation: "reconnect_breaker",
        controller: METER_CONTROLLER,
        method: "reconnectICP",
        params: SupplyPointParams { supply_point_id },
    }
}

/// Granularity of a consumption curve.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CurvePeriod {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Serialize)]
pub struct CurveParams<'a> {
    #[serde(rename = "contId")]
    contract_id: &'a str,

    #[serde(rename = "type")]
    period: CurvePeriod,

    #[serde(rename = "startDate", with = "iso_date")]
    start_date: NaiveDate,
}

pub const fn get_curve(
    contract_id: &str,
    period: CurvePeriod,
    start_date: NaiveDate,
) -> Action<CurveParams<'_>> {
    Action {
        operation: "get_curve",
        controller: METER_CONTROLLER,
        method: "getChartPoints",
        params: CurveParams { contract_id, period, start_date },
    }
}

#[derive(Serialize)]
pub struct MaximeterParams<'a> {
    #[serde(rename = "mapParams")]
    map: MaximeterMap<'a>,
}

#[serde_with::serde_as]
#[derive(Serialize)]
struct MaximeterMap<'a> {
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(rename = "startDate")]
    from: YearMonth,

    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(rename = "endDate")]
    to: YearMonth,

    #[serde(rename = "id")]
    supply_point_id: &'a str,

    #[serde(rename = "sistema")]
    system: &'static str,
}

pub const fn get_year_maximeter(
    supply_point_id: &str,
    from: YearMonth,
    to: YearMonth,
) -> Action<MaximeterParams<'_>> {
    Action {
        operation: "get_year_maximeter",
        controller: MAXIMETER_CONTROLLER,
        method: "getMaximeter",
        params: MaximeterParams { map: MaximeterMap { from, to, supply_point_id, system: "" } },
    }
}

mod iso_date {
    use chrono::NaiveDate;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format("%Y-%m-%d"))
    }
}
