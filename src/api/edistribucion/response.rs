use serde::Deserialize;
use serde_with::serde_as;

use super::error::{Error, Result};

/// Aura framework response to a single-action request.
///
/// The return value is kept as [`serde_json::Value`] so that it can be logged
/// together with a decoding error.
#[serde_as]
#[derive(Deserialize)]
pub struct Response {
    #[serde(default)]
    actions: Vec<ActionResult>,

    #[serde_as(as = "serde_with::VecSkipError<_>")]
    #[serde(default)]
    events: Vec<Event>,

    /// Set on framework-level exceptions, such as an expired session.
    #[serde(default)]
    event: Option<Event>,

    /// Raw body for the decoding errors.
    #[serde(skip)]
    body: String,
}

#[serde_as]
#[derive(Deserialize)]
struct ActionResult {
    state: ActionState,

    #[serde(rename = "returnValue", default)]
    return_value: serde_json::Value,

    #[serde_as(as = "serde_with::VecSkipError<_>")]
    #[serde(default)]
    error: Vec<ActionError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum ActionState {
    Success,
    Error,
    Incomplete,

    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ActionError {
    message: Option<String>,
}

#[derive(Deserialize)]
struct Event {
    descriptor: Option<String>,
}

impl Event {
    fn is_session_rejection(&self) -> bool {
        self.descriptor.as_deref().is_some_and(|descriptor| {
            descriptor.ends_with("aura:invalidSession")
                || descriptor.ends_with("aura:clientOutOfSync")
        })
    }
}

impl Response {
    /// Parse the raw body, which the portal sometimes prefixes with `*/`.
    pub fn parse(operation: &'static str, body: &str) -> Result<Self> {
        let json = body.trim_start().trim_start_matches("*/");
        let mut response: Self =
            serde_json::from_str(json).map_err(|error| Error::decode(operation, error, body))?;
        response.body = body.to_owned();
        Ok(response)
    }

    pub fn into_return_value(self, operation: &'static str) -> Result<serde_json::Value> {
        if self.event.iter().chain(&self.events).any(Event::is_session_rejection) {
            return Err(Error::SessionRejected);
        }
        let Some(action) = self.actions.into_iter().next() else {
            return Err(Error::decode(operation, "no action in the response", self.body));
        };
        match action.state {
            ActionState::Success => Ok(action.return_value),
            ActionState::Error => {
                let messages: Vec<String> =
                    action.error.into_iter().filter_map(|error| error.message).collect();
                let message = if messages.is_empty() {
                    String::from("unspecified error")
                } else {
                    messages.join("; ")
                };
                Err(Error::Portal { operation, message })
            }
            ActionState::Incomplete => {
                Err(Error::Portal { operation, message: String::from("incomplete action") })
            }
            ActionState::Unknown => {
                Err(Error::Portal { operation, message: String::from("unknown action state") })
            }
        }
    }
}
