// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Envelope validation and collection of envelopes for the bulk path.

use crate::constants::{LIB_TAG_KEY, TIME_KEY, TOKEN_KEY};
use crate::envelope::Envelope;
use crate::errors::Error;
use serde_json::Value;

/// Returns true if `candidate` looks like an envelope produced by
/// [`crate::envelope::EnvelopeBuilder`].
///
/// Requires a string `event` and a `properties` object holding `token`, `time` and the
/// library tag. Total over arbitrary input: any other shape is simply invalid.
pub fn is_valid(candidate: &Value) -> bool {
    let Some(object) = candidate.as_object() else {
        return false;
    };
    if !object.get("event").is_some_and(Value::is_string) {
        return false;
    }
    let Some(properties) = object.get("properties").and_then(Value::as_object) else {
        return false;
    };
    [TOKEN_KEY, TIME_KEY, LIB_TAG_KEY]
        .iter()
        .all(|key| properties.contains_key(*key))
}

/// Validates `candidate` and converts it into a typed envelope.
pub fn parse(candidate: Value) -> Result<Envelope, Error> {
    Envelope::try_from(candidate)
}

/// An ordered collection of valid envelopes for one bulk delivery.
///
/// Built fresh for every submission and consumed by [`crate::delivery::BatchDelivery`].
#[derive(Debug, Clone, Default)]
pub struct Batch {
    envelopes: Vec<Envelope>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `candidate` and appends it. Rejected input leaves the batch untouched.
    pub fn add(&mut self, candidate: Value) -> Result<(), Error> {
        self.envelopes.push(parse(candidate)?);
        Ok(())
    }

    pub fn add_envelope(&mut self, envelope: Envelope) {
        self.envelopes.push(envelope);
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.envelopes.iter()
    }

    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    pub fn into_envelopes(self) -> Vec<Envelope> {
        self.envelopes
    }
}

impl From<Vec<Envelope>> for Batch {
    fn from(envelopes: Vec<Envelope>) -> Self {
        Self { envelopes }
    }
}

impl FromIterator<Envelope> for Batch {
    fn from_iter<I: IntoIterator<Item = Envelope>>(iter: I) -> Self {
        Self {
            envelopes: iter.into_iter().collect(),
        }
    }
}
