//! [e-distribución](https://zonaprivada.edistribucion.com) customer portal client.
//!
//! The portal has no public API: this talks to the Aura endpoints behind its web pages.

mod endpoint;
mod error;
mod models;
mod numeric;
mod response;
mod session;
mod transport;

use std::{sync::Arc, time::Duration};

use bon::Builder;
use chrono::NaiveDate;
use reqwest::Url;
use serde::{Serialize, de::DeserializeOwned};

pub use self::{
    endpoint::CurvePeriod,
    error::{Error, Result},
    models::{
        BreakerReconnection,
        BreakerState,
        ConsumptionCurve,
        Contract,
        CurveBucket,
        MaximeterHistogram,
        MeterSnapshot,
    },
    session::{ClientState, Credentials, Session},
    transport::RetryPolicy,
};
use self::{
    endpoint::Action,
    models::{ContractList, CurveData, MaximeterData},
    session::SessionManager,
    transport::Transport,
};
use crate::{period::YearMonth, prelude::*};

pub const DEFAULT_BASE_URL: &str = "https://zonaprivada.edistribucion.com";

#[derive(Builder)]
pub struct ClientConfig {
    base_url: Url,

    /// Bound of every single HTTP request.
    #[builder(default = Duration::from_secs(30))]
    timeout: Duration,

    #[builder(default)]
    retry_policy: RetryPolicy,
}

/// Portal client which owns a single session.
pub struct Api {
    transport: Transport,
    sessions: SessionManager,
}

impl Api {
    pub fn new(config: ClientConfig) -> crate::prelude::Result<Self> {
        Ok(Self {
            transport: Transport::new(config.base_url, config.timeout, config.retry_policy)?,
            sessions: SessionManager::default(),
        })
    }

    /// Log in explicitly. The credentials are kept for silent re-logins.
    pub async fn login(&self, credentials: Credentials) -> Result<()> {
        self.sessions.login(&self.transport, credentials).await
    }

    /// Current session, re-authenticating first if the portal has rejected it.
    pub async fn ensure_valid(&self) -> Result<Arc<Session>> {
        Ok(self.sessions.ensure_valid(&self.transport).await?.0)
    }

    pub async fn state(&self) -> ClientState {
        self.sessions.state().await
    }

    /// Forget the current session as if the portal had rejected it.
    #[cfg(test)]
    pub async fn expire_session(&self) -> Result<()> {
        let session = self.ensure_valid().await?;
        self.sessions.expire(&session).await;
        Ok(())
    }

    /// All supply contracts in the order of the portal.
    #[instrument(skip_all)]
    pub async fn list_contracts(&self) -> Result<Vec<Contract>> {
        info!("fetching…");
        let list: ContractList = self.call(&endpoint::list_contracts()).await?;
        info!(n_contracts = list.contracts.len(), "fetched");
        Ok(list.contracts)
    }

    /// The first contract listed by the portal.
    ///
    /// Accounts with multiple contracts are not disambiguated.
    pub async fn primary_contract(&self) -> Result<Contract> {
        self.list_contracts().await?.into_iter().next().ok_or(Error::NoContracts)
    }

    #[instrument(skip_all, fields(supply_point = contract.supply_point()))]
    pub async fn get_meter(&self, contract: &Contract) -> Result<MeterSnapshot> {
        info!("reading the meter…");
        let meter: MeterSnapshot = self.call(&endpoint::get_meter(contract.supply_point())).await?;
        info!(totalizer = ?meter.totalizer, power = ?meter.current_power, "read");
        Ok(meter)
    }

    pub async fn get_day_curve(
        &self,
        contract: &Contract,
        date: NaiveDate,
    ) -> Result<ConsumptionCurve> {
        self.get_curve(contract, CurvePeriod::Day, date).await
    }

    pub async fn get_week_curve(
        &self,
        contract: &Contract,
        date: NaiveDate,
    ) -> Result<ConsumptionCurve> {
        self.get_curve(contract, CurvePeriod::Week, date).await
    }

    pub async fn get_month_curve(
        &self,
        contract: &Contract,
        date: NaiveDate,
    ) -> Result<ConsumptionCurve> {
        self.get_curve(contract, CurvePeriod::Month, date).await
    }

    pub async fn get_year_curve(
        &self,
        contract: &Contract,
        date: NaiveDate,
    ) -> Result<ConsumptionCurve> {
        self.get_curve(contract, CurvePeriod::Year, date).await
    }

    /// Energy series of the period starting at `date`.
    #[instrument(skip_all, fields(contract = %contract.id, period = ?period, date = %date))]
    pub async fn get_curve(
        &self,
        contract: &Contract,
        period: CurvePeriod,
        date: NaiveDate,
    ) -> Result<ConsumptionCurve> {
        info!("fetching…");
        let data: CurveData = self.call(&endpoint::get_curve(&contract.id, period, date)).await?;
        let curve = data.into_curve(period, date);
        info!(total = ?curve.total, n_buckets = curve.buckets.len(), "fetched");
        Ok(curve)
    }

    #[instrument(skip_all, fields(supply_point = supply_point_id, from = %from, to = %to))]
    pub async fn get_year_maximeter(
        &self,
        supply_point_id: &str,
        from: YearMonth,
        to: YearMonth,
    ) -> Result<MaximeterHistogram> {
        info!("fetching…");
        let data: MaximeterData =
            self.call(&endpoint::get_year_maximeter(supply_point_id, from, to)).await?;
        let histogram = data.into_histogram(from, to);
        info!(peak = ?histogram.peak, n_readings = histogram.readings.len(), "fetched");
        Ok(histogram)
    }

    /// Ask the portal to close the supply breaker again.
    #[instrument(skip_all, fields(supply_point = contract.supply_point()))]
    pub async fn reconnect_breaker(&self, contract: &Contract) -> Result<BreakerReconnection> {
        info!("requesting…");
        let reconnection: BreakerReconnection =
            self.call(&endpoint::reconnect_breaker(contract.supply_point())).await?;
        info!(result = ?reconnection.result, message = ?reconnection.message, "requested");
        Ok(reconnection)
    }

    /// Send the action with the current session and decode its return value.
    ///
    /// A rejected session triggers at most one re-login per call, counting the one
    /// which may happen before sending when the session had already expired.
    async fn call<P, R>(&self, action: &Action<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let (mut session, mut is_fresh) = self.sessions.ensure_valid(&self.transport).await?;
        let return_value = loop {
            match self.transport.send_action(Some(&*session), action).await {
                Err(Error::SessionRejected) if is_fresh => {
                    self.sessions.expire(&session).await;
                    return Err(Error::Auth(String::from(
                        "the portal rejected a freshly established session",
                    )));
                }
                Err(Error::SessionRejected) => {
                    warn!(operation = action.operation, "session rejected, logging in again…");
                    self.sessions.expire(&session).await;
                    // Counts even when a concurrent caller has logged in first.
                    (session, _) = self.sessions.ensure_valid(&self.transport).await?;
                    is_fresh = true;
                }
                result => break result?,
            }
        };
        debug!(operation = action.operation, %return_value, "call succeeded");
        models::decode(action.operation, return_value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
        matchers::{body_string_contains, header, method, path, query_param},
    };

    use super::*;
    use crate::quantity::energy::KilowattHours;

    const LOGIN: &str = "other.LightningLoginFormController.login";
    const LIST_CONTRACTS: &str = "other.WP_ContadorICP_F2_CTRL.getListCups";
    const GET_METER: &str = "other.WP_ContadorICP_F2_CTRL.consultarContador";
    const GET_CURVE: &str = "other.WP_ContadorICP_F2_CTRL.getChartPoints";

    fn aura_success(return_value: &serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "actions": [{"id": "1;a", "state": "SUCCESS", "returnValue": return_value}],
            "context": {"mode": "PROD"}
        }))
    }

    fn aura_action(query_key: &'static str) -> wiremock::MockBuilder {
        Mock::given(method("POST")).and(path("/s/sfsites/aura")).and(query_param(query_key, "1"))
    }

    fn credentials() -> Credentials {
        Credentials { username: String::from("12345678Z"), password: String::from("secret") }
    }

    fn meter_payload() -> serde_json::Value {
        json!({
            "data": {
                "potenciaActual": "0.64",
                "totalizador": "123.45",
                "potenciaContratada": "4.6",
                "percent": "13.91",
                "estadoICP": "Conectado"
            }
        })
    }

    fn new_api(server: &MockServer) -> crate::prelude::Result<Api> {
        Api::new(
            ClientConfig::builder()
                .base_url(server.uri().parse()?)
                .timeout(Duration::from_millis(300))
                .retry_policy(RetryPolicy { max_attempts: 3, backoff: Duration::ZERO })
                .build(),
        )
    }

    /// Mount the two login steps, expecting `n_logins` logins.
    async fn mount_login(server: &MockServer, n_logins: u64) {
        aura_action(LOGIN)
            .respond_with(aura_success(&json!("/secur/frontdoor.jsp?otp=1")))
            .expect(n_logins)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secur/frontdoor.jsp"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/s/")
                    .append_header("Set-Cookie", "sid=S1; Path=/")
                    .append_header("Set-Cookie", "aura_token=T1; Path=/"),
            )
            .expect(n_logins)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_login_then_meter_ok() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        aura_action(GET_METER)
            .and(header("cookie", "sid=S1; aura_token=T1"))
            .and(body_string_contains("aura.token=T1"))
            .respond_with(aura_success(&meter_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        assert_eq!(api.state().await, ClientState::Authenticated);

        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        let meter = api.get_meter(&contract).await?;
        assert_eq!(meter.totalizer, KilowattHours(123.45));
        assert_eq!(meter.breaker, Some(BreakerState::Closed));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_implicit_login() -> crate::prelude::Result {
        let server = MockServer::start().await;
        let api = new_api(&server)?;
        let error = api.list_contracts().await.unwrap_err();
        assert!(matches!(error, Error::NotAuthenticated));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_credentials() -> crate::prelude::Result {
        let server = MockServer::start().await;
        aura_action(LOGIN)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "actions": [{
                    "state": "ERROR",
                    "returnValue": null,
                    "error": [{"message": "Usuario o contraseña incorrectos"}]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secur/frontdoor.jsp"))
            .respond_with(ResponseTemplate::new(302))
            .expect(0)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        let error = api.login(credentials()).await.unwrap_err();
        assert!(matches!(error, Error::Auth(message) if message.contains("incorrectos")));
        assert_eq!(api.state().await, ClientState::AuthFailed);
        assert!(matches!(api.list_contracts().await.unwrap_err(), Error::NotAuthenticated));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_session_relogin_once() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        aura_action(GET_METER)
            .respond_with(aura_success(&meter_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        api.expire_session().await?;
        assert_eq!(api.state().await, ClientState::Expired);

        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        api.get_meter(&contract).await?;
        assert_eq!(api.state().await, ClientState::Authenticated);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_session_relogin_and_retry() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        aura_action(GET_METER)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "event": {"descriptor": "markup://aura:invalidSession"},
                "exceptionEvent": true
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        aura_action(GET_METER)
            .respond_with(aura_success(&meter_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        let meter = api.get_meter(&contract).await?;
        assert_eq!(meter.totalizer, KilowattHours(123.45));
        Ok(())
    }

    #[tokio::test]
    async fn test_persistent_rejection_relogins_once() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        aura_action(GET_METER)
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        let error = api.get_meter(&contract).await.unwrap_err();
        assert!(matches!(error, Error::Auth(_)));
        assert_eq!(api.state().await, ClientState::Expired);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejection_after_relogin_on_expired_session() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        aura_action(GET_METER)
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        api.expire_session().await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        let error = api.get_meter(&contract).await.unwrap_err();
        assert!(matches!(error, Error::Auth(_)));
        assert_eq!(api.state().await, ClientState::Expired);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_relogin_is_not_repeated() -> crate::prelude::Result {
        let server = MockServer::start().await;
        aura_action(LOGIN)
            .respond_with(aura_success(&json!("/secur/frontdoor.jsp?otp=1")))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        aura_action(LOGIN)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "actions": [{"state": "ERROR", "error": [{"message": "Cuenta bloqueada"}]}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secur/frontdoor.jsp"))
            .respond_with(ResponseTemplate::new(302).append_header("Set-Cookie", "sid=S1"))
            .expect(1)
            .mount(&server)
            .await;
        aura_action(GET_METER)
            .respond_with(aura_success(&meter_payload()))
            .expect(0)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        api.expire_session().await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };

        let error = api.get_meter(&contract).await.unwrap_err();
        assert!(matches!(error, Error::Auth(message) if message.contains("bloqueada")));
        assert_eq!(api.state().await, ClientState::AuthFailed);

        let error = api.get_meter(&contract).await.unwrap_err();
        assert!(matches!(error, Error::NotAuthenticated));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_relogin() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        aura_action(GET_METER)
            .respond_with(aura_success(&meter_payload()))
            .expect(2)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        api.expire_session().await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        let (first, second) = tokio::join!(api.get_meter(&contract), api.get_meter(&contract));
        first?;
        second?;
        Ok(())
    }

    #[tokio::test]
    async fn test_timeouts_exhaust_retries_without_relogin() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        aura_action(GET_METER)
            .respond_with(aura_success(&meter_payload()).set_delay(Duration::from_secs(2)))
            .expect(3)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        let error = api.get_meter(&contract).await.unwrap_err();
        assert!(matches!(error, Error::Transport { attempts: 3, .. }));
        assert_eq!(api.state().await, ClientState::Authenticated);
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_is_retried() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        aura_action(GET_METER)
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        aura_action(GET_METER)
            .respond_with(aura_success(&meter_payload()))
            .expect(1)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        api.get_meter(&contract).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_portal_error_not_retried() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        aura_action(GET_METER)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "actions": [{"state": "ERROR", "error": [{"message": "CUPS no encontrado"}]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        let error = api.get_meter(&contract).await.unwrap_err();
        assert!(matches!(error, Error::Portal { operation: "get_meter", .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_primary_contract_is_first() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        aura_action(LIST_CONTRACTS)
            .respond_with(aura_success(&json!({"data": {"lstCups": [{"Id": "A1"}, {"Id": "A2"}]}})))
            .expect(1)
            .mount(&server)
            .await;
        aura_action(GET_METER)
            .and(body_string_contains("A1"))
            .respond_with(aura_success(&meter_payload()))
            .expect(1)
            .mount(&server)
            .await;
        aura_action(GET_METER)
            .and(body_string_contains("A2"))
            .respond_with(aura_success(&meter_payload()))
            .expect(0)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        let contract = api.primary_contract().await?;
        assert_eq!(contract.id, "A1");
        api.get_meter(&contract).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_no_contracts() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        aura_action(LIST_CONTRACTS)
            .respond_with(aura_success(&json!({"data": {"lstCups": []}})))
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        assert!(matches!(api.primary_contract().await.unwrap_err(), Error::NoContracts));
        Ok(())
    }

    #[tokio::test]
    async fn test_day_curve_ok() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        aura_action(GET_CURVE)
            .and(body_string_contains("2024-01-01"))
            .respond_with(aura_success(&json!({
                "data": {
                    "totalValue": 10.5,
                    "points": [
                        {"date": "01/01/2024", "hour": 1, "value": 0.5},
                        {"date": "01/01/2024", "hour": 2, "value": 0.25},
                        {"date": "01/01/2024", "hour": 3, "value": 0.75}
                    ]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).context("invalid date")?;
        let curve = api.get_day_curve(&contract, date).await?;
        assert_eq!(curve.total, KilowattHours(10.5));
        assert_eq!(curve.buckets.len(), 3);
        assert_eq!(curve.period, CurvePeriod::Day);
        Ok(())
    }

    #[tokio::test]
    async fn test_meter_without_totalizer_fails() -> crate::prelude::Result {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        aura_action(GET_METER)
            .respond_with(aura_success(&json!({"data": {"potenciaActual": "0.64"}})))
            .mount(&server)
            .await;

        let api = new_api(&server)?;
        api.login(credentials()).await?;
        let contract = Contract { id: String::from("A1"), supply_point_id: None, label: None };
        let error = api.get_meter(&contract).await.unwrap_err();
        assert!(matches!(error, Error::Decode { operation: "get_meter", .. }));
        Ok(())
    }
}
