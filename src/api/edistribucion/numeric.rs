use std::borrow::Cow;

use serde::{Deserialize, Deserializer, de};
use serde_with::DeserializeAs;

/// Number which the portal sends either as JSON number or as a string.
///
/// Strings may use a decimal comma and carry a trailing `%`.
/// Anything else is an error and never becomes zero.
pub struct Numeric;

impl<'de, T: From<f64>> DeserializeAs<'de, T> for Numeric {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(T::from(value)),
            Raw::Text(text) => parse(&text).map(T::from).ok_or_else(|| {
                de::Error::invalid_value(de::Unexpected::Str(&text), &"a decimal number")
            }),
        }
    }
}

fn parse(text: &str) -> Option<f64> {
    let text = text.trim().trim_end_matches('%').trim_end();
    let text = if !text.contains('.') && text.matches(',').count() == 1 {
        Cow::Owned(text.replace(',', "."))
    } else {
        Cow::Borrowed(text)
    };
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}
