// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Ledger currency amounts, denominated in wei.
pub type Wei = u128;

pub const WEI_PER_ETHER: Wei = 1_000_000_000_000_000_000;

/// Highest index the ledger hands out to an oracle.
pub const MAX_ORACLE_INDEX: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseHexError {
    #[error("missing 0x prefix in '{value}'")]
    MissingPrefix { value: String },
    #[error("expected {expected} bytes of hex, got '{value}'")]
    Length { expected: usize, value: String },
    #[error("invalid hex in '{value}'")]
    Digits { value: String },
}

fn parse_prefixed_hex<const N: usize>(value: &str) -> Result<[u8; N], ParseHexError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| ParseHexError::MissingPrefix {
            value: value.to_string(),
        })?;
    if digits.len() != N * 2 {
        return Err(ParseHexError::Length {
            expected: N,
            value: value.to_string(),
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|_| ParseHexError::Digits {
        value: value.to_string(),
    })?;
    Ok(out)
}

macro_rules! hex_newtype {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseHexError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                parse_prefixed_hex::<$len>(value).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// 20-byte ledger account identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

hex_newtype!(Address, 20);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);
}

/// Ledger-derived lookup alias for a flight, hashed from airline, flight code and timestamp.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FlightKey([u8; 32]);

hex_newtype!(FlightKey, 32);

/// Flight status codes understood by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum StatusCode {
    #[default]
    Unknown = 0,
    OnTime = 10,
    LateAirline = 20,
    LateWeather = 30,
    LateTechnical = 40,
    LateOther = 50,
}

impl StatusCode {
    /// Outcomes an oracle can report; `Unknown` is never reported.
    pub const REPORTABLE: [StatusCode; 5] = [
        StatusCode::OnTime,
        StatusCode::LateAirline,
        StatusCode::LateWeather,
        StatusCode::LateTechnical,
        StatusCode::LateOther,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusCode::Unknown => "unknown",
            StatusCode::OnTime => "on time",
            StatusCode::LateAirline => "late due to airline",
            StatusCode::LateWeather => "late due to weather",
            StatusCode::LateTechnical => "late due to technical reason",
            StatusCode::LateOther => "late due to other reason",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unrecognised flight status code {0}")]
pub struct UnknownStatusCode(pub u8);

impl TryFrom<u8> for StatusCode {
    type Error = UnknownStatusCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Unknown),
            10 => Ok(StatusCode::OnTime),
            20 => Ok(StatusCode::LateAirline),
            30 => Ok(StatusCode::LateWeather),
            40 => Ok(StatusCode::LateTechnical),
            50 => Ok(StatusCode::LateOther),
            other => Err(UnknownStatusCode(other)),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        StatusCode::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("oracle index {index} exceeds max {max}")]
    OutOfRange { index: u8, max: u8 },
    #[error("oracle indexes {indexes:?} are not distinct")]
    Duplicate { indexes: [u8; 3] },
}

/// The three distinct indexes the ledger assigned to one oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OracleIndexes([u8; 3]);

impl OracleIndexes {
    pub fn new(indexes: [u8; 3]) -> Result<Self, IndexError> {
        if let Some(&index) = indexes.iter().find(|&&i| i > MAX_ORACLE_INDEX) {
            return Err(IndexError::OutOfRange {
                index,
                max: MAX_ORACLE_INDEX,
            });
        }
        let distinct: BTreeSet<u8> = indexes.iter().copied().collect();
        if distinct.len() != indexes.len() {
            return Err(IndexError::Duplicate { indexes });
        }
        Ok(Self(indexes))
    }

    pub fn contains(&self, index: u8) -> bool {
        self.0.contains(&index)
    }

    pub fn as_array(&self) -> [u8; 3] {
        self.0
    }
}

impl fmt::Display for OracleIndexes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.0[0], self.0[1], self.0[2])
    }
}

/// A registered oracle identity. Immutable once registration completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Oracle {
    pub identity: Address,
    pub indexes: OracleIndexes,
}

/// Active oracle set produced by registration, in account-pool order.
#[derive(Debug, Clone, Default)]
pub struct OracleSet {
    oracles: Vec<Oracle>,
}

impl OracleSet {
    pub fn new(oracles: Vec<Oracle>) -> Self {
        Self { oracles }
    }

    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Oracle> {
        self.oracles.iter()
    }

    /// Oracles allowed to answer a request raised under `index`.
    pub fn matching(&self, index: u8) -> impl Iterator<Item = &Oracle> {
        self.oracles.iter().filter(move |o| o.indexes.contains(index))
    }
}

/// Ledger request for a flight status, consumed transiently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub index: u8,
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
}

/// Local mirror of a ledger flight. Replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecord {
    pub id: u64,
    pub key: FlightKey,
    pub flight_name: String,
    pub airline: Address,
    pub departure_time: u64,
    pub status_code: StatusCode,
}

/// Consensus response slot stored by the ledger for a flight key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleResponseInfo {
    pub key: FlightKey,
    pub requester: Address,
    pub is_open: bool,
    pub status_code: StatusCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trips_through_display() {
        let addr: Address = "0x00000000000000000000000000000000000000Ab".parse().unwrap();
        assert_eq!(
            addr.to_string(),
            "0x00000000000000000000000000000000000000ab"
        );
        assert_eq!(addr.as_bytes()[19], 0xab);
    }

    #[test]
    fn address_parse_rejects_bad_input() {
        assert!(matches!(
            "1234".parse::<Address>(),
            Err(ParseHexError::MissingPrefix { .. })
        ));
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(ParseHexError::Length { expected: 20, .. })
        ));
        assert!(matches!(
            "0xzz00000000000000000000000000000000000000".parse::<Address>(),
            Err(ParseHexError::Digits { .. })
        ));
    }

    #[test]
    fn oracle_indexes_require_three_distinct_values() {
        assert!(OracleIndexes::new([1, 4, 7]).is_ok());
        assert_eq!(
            OracleIndexes::new([1, 1, 7]),
            Err(IndexError::Duplicate { indexes: [1, 1, 7] })
        );
        assert_eq!(
            OracleIndexes::new([1, 2, 10]),
            Err(IndexError::OutOfRange { index: 10, max: 9 })
        );
    }

    #[test]
    fn status_codes_map_to_labels() {
        assert_eq!(StatusCode::try_from(20).unwrap(), StatusCode::LateAirline);
        assert_eq!(StatusCode::LateAirline.label(), "late due to airline");
        assert_eq!(StatusCode::try_from(15), Err(UnknownStatusCode(15)));
        assert!(!StatusCode::REPORTABLE.contains(&StatusCode::Unknown));
    }

    #[test]
    fn flight_record_serializes_camel_case() {
        let record = FlightRecord {
            id: 1,
            key: FlightKey::default(),
            flight_name: "F1".to_string(),
            airline: Address::ZERO,
            departure_time: 1000,
            status_code: StatusCode::OnTime,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["flightName"], "F1");
        assert_eq!(json["departureTime"], 1000);
        assert_eq!(json["statusCode"], 10);
        assert_eq!(
            json["airline"],
            "0x0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn oracle_set_filters_by_index() {
        let make = |byte: u8, idx: [u8; 3]| Oracle {
            identity: Address::new([byte; 20]),
            indexes: OracleIndexes::new(idx).unwrap(),
        };
        let set = OracleSet::new(vec![make(1, [0, 1, 2]), make(2, [2, 3, 4]), make(3, [5, 6, 7])]);
        let hits: Vec<_> = set.matching(2).map(|o| o.identity).collect();
        assert_eq!(hits, vec![Address::new([1; 20]), Address::new([2; 20])]);
        assert_eq!(set.matching(9).count(), 0);
    }
}
