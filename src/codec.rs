//! Filter command codec.
//!
//! Outbound commands:
//!
//! | Command | Wire form |
//! |---------|-----------|
//! | legacy change | `$FILTER,<letter>,<servoDegrees>` |
//! | two-digit change | `SPECTRAL:<a><b>` |
//! | timed sequence | `$TIMED_FILTER,<compact>` |
//!
//! Inbound acknowledgements are `SPECTRAL_ACK:<ab>`, `$FILTER_ACK,<letter>,<deg>`
//! and `$FILTER_STATUS,<letter>,<deg>,<status>`. Lines that are not filter traffic
//! come back as [`Inbound::NotFilter`] so the caller can try the telemetry decoder.

use std::time::SystemTime;

use crate::sequence::TimedSequence;
use crate::types::{ColorPair, FilterCode, FilterState, LegacyFilter};
use crate::Result;

pub const FILTER_PREFIX: &str = "$FILTER,";
pub const SPECTRAL_PREFIX: &str = "SPECTRAL:";
pub const TIMED_FILTER_PREFIX: &str = "$TIMED_FILTER,";
pub const SPECTRAL_ACK_PREFIX: &str = "SPECTRAL_ACK:";
pub const FILTER_ACK_PREFIX: &str = "$FILTER_ACK,";
pub const FILTER_STATUS_PREFIX: &str = "$FILTER_STATUS,";

/// Switches the payload's telemetry stream on.
pub const START_TELEMETRY: &str = "START_TELEMETRY";

/// Triggers the payload release mechanism.
pub const RELEASE: &str = "RELEASE";

/// Status value that means the wheel has settled.
pub const STATUS_OK: &str = "OK";

/// `$FILTER,<letter>,<degrees>`
pub fn encode_legacy(filter: LegacyFilter) -> String {
    format!("{}{},{}", FILTER_PREFIX, filter.letter(), filter.servo_degrees())
}

/// `SPECTRAL:<a><b>`
pub fn encode_spectral(pair: ColorPair) -> String {
    format!("{}{}", SPECTRAL_PREFIX, pair)
}

/// `SPECTRAL:<a><b>` from raw digits; out-of-range digits fail before anything is built.
pub fn encode_spectral_digits(a: u8, b: u8) -> Result<String> {
    ColorPair::from_digits(a, b).map(encode_spectral)
}

/// Wire command for a code in its own dialect.
pub fn encode_filter(code: FilterCode) -> String {
    match code {
        FilterCode::Legacy(filter) => encode_legacy(filter),
        FilterCode::Spectral(pair) => encode_spectral(pair),
    }
}

/// `$TIMED_FILTER,<compact>` carrying the sequence's source string verbatim.
pub fn encode_timed(sequence: &TimedSequence) -> String {
    format!("{}{}", TIMED_FILTER_PREFIX, sequence.source())
}

/// A decoded filter acknowledgement or status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterMessage {
    SpectralAck { pair: ColorPair },
    FilterAck { filter: LegacyFilter, degrees: u16 },
    FilterStatus { filter: LegacyFilter, degrees: u16, status: String },
}

impl FilterMessage {
    /// Code the device reports.
    pub fn code(&self) -> FilterCode {
        match self {
            FilterMessage::SpectralAck { pair } => FilterCode::Spectral(*pair),
            FilterMessage::FilterAck { filter, .. } | FilterMessage::FilterStatus { filter, .. } => {
                FilterCode::Legacy(*filter)
            }
        }
    }

    /// Whether the wheel is still moving after this message.
    pub fn is_changing(&self) -> bool {
        match self {
            FilterMessage::FilterStatus { status, .. } => !status.eq_ignore_ascii_case(STATUS_OK),
            _ => false,
        }
    }

    /// Fold this message into the wheel state.
    pub fn apply(&self, state: &mut FilterState, now: SystemTime) {
        match self {
            FilterMessage::SpectralAck { pair } => {
                state.settle(FilterCode::Spectral(*pair), None, now);
            }
            FilterMessage::FilterAck { filter, degrees } => {
                state.settle(FilterCode::Legacy(*filter), Some(*degrees), now);
            }
            FilterMessage::FilterStatus { filter, degrees, .. } => {
                let code = FilterCode::Legacy(*filter);
                if !state.code.same_position(code) {
                    state.last_change = now;
                }
                state.code = code;
                state.servo_degrees = Some(*degrees);
                state.changing = self.is_changing();
            }
        }
    }
}

/// Classification of one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<'a> {
    Filter(FilterMessage),
    /// Has a filter prefix but an unusable payload
    Malformed { line: &'a str, reason: String },
    /// Not filter traffic; hand it to the telemetry decoder
    NotFilter(&'a str),
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &line[prefix.len()..])
}

fn parse_letter(field: &str) -> std::result::Result<LegacyFilter, String> {
    let mut chars = field.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) => {
            LegacyFilter::from_letter(letter).map_err(|_| format!("unknown filter letter '{letter}'"))
        }
        _ => Err(format!("expected a filter letter, got '{}'", field.trim())),
    }
}

fn parse_degrees(field: &str) -> std::result::Result<u16, String> {
    field.trim().parse().map_err(|_| format!("invalid servo degrees '{}'", field.trim()))
}

fn parse_legacy_fields(payload: &str, with_status: bool) -> std::result::Result<FilterMessage, String> {
    let fields: Vec<&str> = payload.split(',').collect();
    let expected = if with_status { 3 } else { 2 };
    if fields.len() != expected {
        return Err(format!("expected {} fields, found {}", expected, fields.len()));
    }
    let filter = parse_letter(fields[0])?;
    let degrees = parse_degrees(fields[1])?;
    if with_status {
        Ok(FilterMessage::FilterStatus { filter, degrees, status: fields[2].trim().to_string() })
    } else {
        Ok(FilterMessage::FilterAck { filter, degrees })
    }
}

/// Classify an inbound line.
pub fn decode_inbound(line: &str) -> Inbound<'_> {
    let trimmed = line.trim();

    let parsed = if let Some(payload) = strip_prefix_ignore_case(trimmed, SPECTRAL_ACK_PREFIX) {
        ColorPair::parse(payload)
            .map(|pair| FilterMessage::SpectralAck { pair })
            .map_err(|e| e.to_string())
    } else if let Some(payload) = strip_prefix_ignore_case(trimmed, FILTER_ACK_PREFIX) {
        parse_legacy_fields(payload, false)
    } else if let Some(payload) = strip_prefix_ignore_case(trimmed, FILTER_STATUS_PREFIX) {
        parse_legacy_fields(payload, true)
    } else {
        return Inbound::NotFilter(line);
    };

    match parsed {
        Ok(message) => Inbound::Filter(message),
        Err(reason) => Inbound::Malformed { line, reason },
    }
}
