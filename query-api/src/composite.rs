// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::str::FromStr;

use core_types::Address;
use percent_encoding::percent_decode_str;

use crate::QueryError;

/// `airline.flight.timestamp` path segment naming one flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
}

impl Composite {
    /// Parses a raw URL path segment, percent-decoding it first.
    pub fn from_path_segment(raw: &str) -> Result<Self, QueryError> {
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|err| QueryError::Malformed(format!("invalid path segment {raw:?}: {err}")))?;
        decoded.parse()
    }
}

impl FromStr for Composite {
    type Err = QueryError;

    fn from_str(segment: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = segment.split('.').collect();
        let [airline, flight, timestamp] = parts.as_slice() else {
            return Err(QueryError::Malformed(format!(
                "expected airline.flight.timestamp, got {segment:?}"
            )));
        };
        let airline = airline
            .parse::<Address>()
            .map_err(|err| QueryError::Malformed(format!("invalid airline {airline:?}: {err}")))?;
        if flight.is_empty() {
            return Err(QueryError::Malformed("empty flight code".to_string()));
        }
        let timestamp = timestamp.parse::<u64>().map_err(|err| {
            QueryError::Malformed(format!("invalid timestamp {timestamp:?}: {err}"))
        })?;
        Ok(Self {
            airline,
            flight: flight.to_string(),
            timestamp,
        })
    }
}
