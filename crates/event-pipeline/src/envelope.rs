// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Envelope construction.
//!
//! An [`Envelope`] is one event occurrence in the shape the collectors expect:
//!
//! ```json
//! {"event": "login", "properties": {"token": "...", "time": 1700000000, "sugo_lib": "rust"}}
//! ```
//!
//! Envelopes are immutable once built. The builder injects the required metadata but never
//! validates the event name; that is the job of [`crate::batch::is_valid`].

use crate::batch;
use crate::constants::{DISTINCT_ID_KEY, LIB_TAG_KEY, LIB_TAG_VALUE, TIME_KEY, TOKEN_KEY};
use crate::errors::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A validated event record. Deserialization goes through [`batch::is_valid`], so every
/// `Envelope` carries `token`, `time` and the library tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct Envelope {
    event: String,
    properties: Map<String, Value>,
}

impl Envelope {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn distinct_id(&self) -> Option<&str> {
        self.properties.get(DISTINCT_ID_KEY).and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(2);
        object.insert("event".to_string(), Value::from(self.event.as_str()));
        object.insert(
            "properties".to_string(),
            Value::Object(self.properties.clone()),
        );
        Value::Object(object)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl TryFrom<Value> for Envelope {
    type Error = Error;

    fn try_from(candidate: Value) -> Result<Self, Error> {
        if !batch::is_valid(&candidate) {
            return Err(Error::InvalidEnvelope { candidate });
        }
        let (event, properties) = match candidate {
            Value::Object(mut object) => (object.remove("event"), object.remove("properties")),
            other => return Err(Error::InvalidEnvelope { candidate: other }),
        };
        match (event, properties) {
            (Some(Value::String(event)), Some(Value::Object(properties))) => {
                Ok(Envelope { event, properties })
            }
            (event, properties) => Err(Error::InvalidEnvelope {
                candidate: serde_json::json!({ "event": event, "properties": properties }),
            }),
        }
    }
}

/// Builds envelopes on behalf of one client token.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    token: String,
}

impl EnvelopeBuilder {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Builds an envelope with no actor id.
    pub fn event<P>(&self, event_name: &str, properties: &P) -> Result<Envelope, Error>
    where
        P: Serialize + ?Sized,
    {
        self.build(None, event_name, properties)
    }

    /// Builds an envelope from caller input.
    ///
    /// `properties` may be anything serializing to a JSON object, or to `null` for "no
    /// properties". The value is copied, so later changes on the caller side never reach the
    /// envelope. `token`, `time` and the library tag are only injected when the caller did not
    /// set them; a given `distinct_id` always wins.
    ///
    /// Returns [`Error::Construction`] when `properties` does not serialize to an object.
    pub fn build<P>(
        &self,
        distinct_id: Option<&str>,
        event_name: &str,
        properties: &P,
    ) -> Result<Envelope, Error>
    where
        P: Serialize + ?Sized,
    {
        let time = unix_time_secs();

        let mut properties = match serde_json::to_value(properties)
            .map_err(|e| Error::Construction(e.to_string()))?
        {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(Error::Construction(format!(
                    "properties must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        properties
            .entry(TOKEN_KEY)
            .or_insert_with(|| Value::from(self.token.as_str()));
        properties
            .entry(TIME_KEY)
            .or_insert_with(|| Value::from(time));
        properties
            .entry(LIB_TAG_KEY)
            .or_insert_with(|| Value::from(LIB_TAG_VALUE));

        if let Some(distinct_id) = distinct_id {
            properties.insert(DISTINCT_ID_KEY.to_string(), Value::from(distinct_id));
        }

        Ok(Envelope {
            event: event_name.to_string(),
            properties,
        })
    }
}

fn unix_time_secs() -> i64 {
    Utc::now().timestamp()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
