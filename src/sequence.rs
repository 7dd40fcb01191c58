//! Compact timed-sequence notation.
//!
//! A timed sequence is written as duration+letter pairs, e.g. `3g5r2b1n`: hold
//! green for 3 s, red for 5 s, blue for 2 s, then normal for 1 s. The grammar is
//! `(\d+[A-Za-z])+` over the legacy filter letters, matched against the whole
//! input.
//!
//! The same string goes to the device verbatim in `$TIMED_FILTER,...` and drives
//! local step timing, so a [`TimedSequence`] can only be built by parsing its
//! source. Its steps always describe the string it will send.

use std::time::Duration;
use thiserror::Error;

use crate::types::{FilterCode, LegacyFilter};
use crate::{LinkError, Result};

/// Default cap on the summed step durations.
pub const DEFAULT_MAX_SEQUENCE_SECS: u64 = 300;

/// Why a compact sequence string was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceRejection {
    #[error("sequence is empty")]
    Empty,

    #[error("expected a duration at position {position}, found '{found}'")]
    MissingDuration { position: usize, found: char },

    #[error("duration at the end of the input has no filter letter")]
    MissingFilter,

    #[error("unknown filter letter '{letter}' at position {position}")]
    UnknownFilter { position: usize, letter: char },

    #[error("unexpected character '{found}' at position {position}")]
    Malformed { position: usize, found: char },

    #[error("step {step} has a zero duration")]
    ZeroDuration { step: usize },

    #[error("sequence contains no steps")]
    NoSteps,

    #[error("total duration {total_secs}s exceeds the {max_secs}s limit")]
    TooLong { total_secs: u64, max_secs: u64 },
}

/// One hold position of a timed sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterStep {
    pub code: FilterCode,
    pub seconds: u64,
}

impl FilterStep {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds)
    }
}

/// A parsed, non-empty timed sequence together with its source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedSequence {
    source: String,
    steps: Vec<FilterStep>,
}

impl TimedSequence {
    /// Parse compact notation without a duration cap.
    ///
    /// Surrounding whitespace is trimmed; the trimmed text becomes the source
    /// sent to the device.
    pub fn parse(input: &str) -> std::result::Result<Self, SequenceRejection> {
        let source = input.trim();
        if source.is_empty() {
            return Err(SequenceRejection::Empty);
        }

        let mut steps = Vec::new();
        let mut chars = source.char_indices().peekable();

        while chars.peek().is_some() {
            let mut seconds: u64 = 0;
            let mut digits = 0usize;
            while let Some(&(_, c)) = chars.peek() {
                let Some(digit) = c.to_digit(10) else { break };
                seconds = seconds.saturating_mul(10).saturating_add(u64::from(digit));
                digits += 1;
                chars.next();
            }

            match chars.next() {
                None => return Err(SequenceRejection::MissingFilter),
                Some((position, found)) if digits == 0 => {
                    return Err(SequenceRejection::MissingDuration { position, found });
                }
                Some((position, letter)) if letter.is_ascii_alphabetic() => {
                    let filter = LegacyFilter::from_letter(letter)
                        .map_err(|_| SequenceRejection::UnknownFilter { position, letter })?;
                    if seconds == 0 {
                        return Err(SequenceRejection::ZeroDuration { step: steps.len() });
                    }
                    steps.push(FilterStep { code: FilterCode::Legacy(filter), seconds });
                }
                Some((position, found)) => {
                    return Err(SequenceRejection::Malformed { position, found });
                }
            }
        }

        if steps.is_empty() {
            return Err(SequenceRejection::NoSteps);
        }

        Ok(Self { source: source.to_string(), steps })
    }

    /// Parse and enforce the total-duration cap.
    pub fn validate(input: &str, max_total: Duration) -> Result<Self> {
        let sequence =
            Self::parse(input).map_err(|reason| LinkError::invalid_sequence(input, reason))?;
        sequence.check_total(max_total)?;
        Ok(sequence)
    }

    /// Fail with [`SequenceRejection::TooLong`] when the steps add up to more than `max_total`.
    pub fn check_total(&self, max_total: Duration) -> Result<()> {
        let max_secs = max_total.as_secs();
        let total_secs = self.total_seconds();
        if total_secs > max_secs {
            return Err(LinkError::invalid_sequence(
                self.source.as_str(),
                SequenceRejection::TooLong { total_secs, max_secs },
            ));
        }
        Ok(())
    }

    /// Compact string exactly as it is sent to the device.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn steps(&self) -> &[FilterStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; an empty sequence cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_seconds(&self) -> u64 {
        self.steps.iter().fold(0u64, |total, step| total.saturating_add(step.seconds))
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(self.total_seconds())
    }
}

/// Quick shape check for operator input: does it start like a timed sequence?
pub fn looks_like_sequence(input: &str) -> bool {
    let mut chars = input.trim().chars().peekable();
    let mut saw_digit = false;
    while let Some(c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        saw_digit = true;
        chars.next();
    }
    saw_digit && chars.next().is_some_and(|c| LegacyFilter::from_letter(c).is_ok())
}
