//! Filter wheel identities.
//!
//! The device firmware speaks two dialects for the same wheel: a legacy
//! one-letter scheme with servo degrees and a two-digit color-pair scheme.
//! Both are represented by [`FilterCode`], and every code converts to the
//! canonical [`ColorPair`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::{LinkError, Result};

/// One color slot of the wheel pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Clear,
    Red,
    Green,
    Blue,
}

impl Color {
    /// Parse a wire digit (0-3).
    pub fn from_digit(digit: u8) -> Result<Self> {
        match digit {
            0 => Ok(Color::Clear),
            1 => Ok(Color::Red),
            2 => Ok(Color::Green),
            3 => Ok(Color::Blue),
            _ => Err(LinkError::InvalidColorDigit { digit }),
        }
    }

    /// Wire digit for this color.
    pub fn digit(self) -> u8 {
        match self {
            Color::Clear => 0,
            Color::Red => 1,
            Color::Green => 2,
            Color::Blue => 3,
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Color::Clear => "Transparent",
            Color::Red => "Red",
            Color::Green => "Green",
            Color::Blue => "Blue",
        }
    }

    fn max_color(self, other: Color) -> Color {
        if self.digit() >= other.digit() { self } else { other }
    }
}

/// Canonical `(colorA, colorB)` wheel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorPair {
    pub a: Color,
    pub b: Color,
}

impl ColorPair {
    /// Both slots clear.
    pub const CLEAR: ColorPair = ColorPair { a: Color::Clear, b: Color::Clear };

    pub const fn new(a: Color, b: Color) -> Self {
        Self { a, b }
    }

    /// Build from two wire digits, rejecting anything outside 0-3.
    pub fn from_digits(a: u8, b: u8) -> Result<Self> {
        Ok(Self { a: Color::from_digit(a)?, b: Color::from_digit(b)? })
    }

    /// Parse a two-character digit code such as `"13"`.
    pub fn parse(code: &str) -> Result<Self> {
        let bytes = code.trim().as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(LinkError::InvalidFilterCode { code: code.to_string() });
        }
        Self::from_digits(bytes[0] - b'0', bytes[1] - b'0')
    }

    /// The two wire digits.
    pub fn digits(self) -> (u8, u8) {
        (self.a.digit(), self.b.digit())
    }

    /// Color seen through both slots.
    ///
    /// Clear slots pass the other color through; the three two-color mixes get
    /// their composite hex color regardless of slot order.
    pub fn mixed_color(self) -> &'static str {
        let (a, b) = self.digits();
        match (a.min(b), a.max(b)) {
            (0, 0) => Color::Clear.name(),
            (0, _) => self.a.max_color(self.b).name(),
            (x, y) if x == y => self.a.name(),
            (1, 2) => "#FF8800",
            (1, 3) => "#FF00FF",
            (2, 3) => "#00FFFF",
            _ => "Purple",
        }
    }
}

impl fmt::Display for ColorPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.a.digit(), self.b.digit())
    }
}

/// Legacy single-letter filter positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegacyFilter {
    Normal,
    Red,
    Green,
    Blue,
    Maroon,
    Forest,
    Purple,
    Yellow,
    Cyan,
}

impl LegacyFilter {
    pub const ALL: [LegacyFilter; 9] = [
        LegacyFilter::Normal,
        LegacyFilter::Red,
        LegacyFilter::Green,
        LegacyFilter::Blue,
        LegacyFilter::Maroon,
        LegacyFilter::Forest,
        LegacyFilter::Purple,
        LegacyFilter::Yellow,
        LegacyFilter::Cyan,
    ];

    /// Parse a filter letter, case-insensitive.
    pub fn from_letter(letter: char) -> Result<Self> {
        match letter.to_ascii_uppercase() {
            'N' => Ok(LegacyFilter::Normal),
            'R' => Ok(LegacyFilter::Red),
            'G' => Ok(LegacyFilter::Green),
            'B' => Ok(LegacyFilter::Blue),
            'M' => Ok(LegacyFilter::Maroon),
            'F' => Ok(LegacyFilter::Forest),
            'P' => Ok(LegacyFilter::Purple),
            'Y' => Ok(LegacyFilter::Yellow),
            'C' => Ok(LegacyFilter::Cyan),
            _ => Err(LinkError::InvalidFilterCode { code: letter.to_string() }),
        }
    }

    /// Upper-case wire letter.
    pub fn letter(self) -> char {
        match self {
            LegacyFilter::Normal => 'N',
            LegacyFilter::Red => 'R',
            LegacyFilter::Green => 'G',
            LegacyFilter::Blue => 'B',
            LegacyFilter::Maroon => 'M',
            LegacyFilter::Forest => 'F',
            LegacyFilter::Purple => 'P',
            LegacyFilter::Yellow => 'Y',
            LegacyFilter::Cyan => 'C',
        }
    }

    /// Servo angle used by firmware that still drives a single wheel.
    pub fn servo_degrees(self) -> u16 {
        match self {
            LegacyFilter::Normal => 0,
            LegacyFilter::Red => 45,
            LegacyFilter::Green => 90,
            LegacyFilter::Blue => 135,
            LegacyFilter::Maroon => 180,
            LegacyFilter::Forest => 225,
            LegacyFilter::Purple => 270,
            LegacyFilter::Yellow => 315,
            LegacyFilter::Cyan => 360,
        }
    }

    /// Canonical color pair. Maroon and Forest are approximated by doubling the slot.
    pub fn pair(self) -> ColorPair {
        use Color::*;
        match self {
            LegacyFilter::Normal => ColorPair::new(Clear, Clear),
            LegacyFilter::Red => ColorPair::new(Red, Clear),
            LegacyFilter::Green => ColorPair::new(Green, Clear),
            LegacyFilter::Blue => ColorPair::new(Blue, Clear),
            LegacyFilter::Yellow => ColorPair::new(Red, Green),
            LegacyFilter::Purple => ColorPair::new(Red, Blue),
            LegacyFilter::Cyan => ColorPair::new(Green, Blue),
            LegacyFilter::Maroon => ColorPair::new(Red, Red),
            LegacyFilter::Forest => ColorPair::new(Green, Green),
        }
    }

    /// Inverse of [`LegacyFilter::pair`]. Pairs with no letter return `None`.
    pub fn from_pair(pair: ColorPair) -> Option<Self> {
        Self::ALL.into_iter().find(|filter| filter.pair() == pair)
    }

    pub fn description(self) -> &'static str {
        match self {
            LegacyFilter::Normal => "Normal",
            LegacyFilter::Red => "Light Red",
            LegacyFilter::Green => "Light Green",
            LegacyFilter::Blue => "Light Blue",
            LegacyFilter::Maroon => "Maroon Red",
            LegacyFilter::Forest => "Forest/Dark Green",
            LegacyFilter::Purple => "Purple, Pink",
            LegacyFilter::Yellow => "Yellow, Brown",
            LegacyFilter::Cyan => "Cyan, Turquoise",
        }
    }
}

/// Which command family to speak when converting between dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterProtocol {
    /// `SPECTRAL:xy`
    #[default]
    Spectral,
    /// `$FILTER,L,deg`
    Legacy,
}

/// A filter selection in either wire dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterCode {
    Legacy(LegacyFilter),
    Spectral(ColorPair),
}

impl FilterCode {
    /// Parse either a single filter letter or a two-digit color pair.
    pub fn parse(code: &str) -> Result<Self> {
        let trimmed = code.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) if letter.is_ascii_alphabetic() => {
                LegacyFilter::from_letter(letter).map(FilterCode::Legacy)
            }
            _ => ColorPair::parse(trimmed).map(FilterCode::Spectral),
        }
    }

    /// Canonical pair for this code.
    pub fn pair(self) -> ColorPair {
        match self {
            FilterCode::Legacy(filter) => filter.pair(),
            FilterCode::Spectral(pair) => pair,
        }
    }

    /// Legacy letter for this code, when the pair has one.
    pub fn legacy(self) -> Option<LegacyFilter> {
        match self {
            FilterCode::Legacy(filter) => Some(filter),
            FilterCode::Spectral(pair) => LegacyFilter::from_pair(pair),
        }
    }

    /// Servo angle, when the code maps onto a legacy position.
    pub fn servo_degrees(self) -> Option<u16> {
        self.legacy().map(LegacyFilter::servo_degrees)
    }

    /// Re-express this code in the given dialect.
    pub fn for_protocol(self, protocol: FilterProtocol) -> Result<Self> {
        match protocol {
            FilterProtocol::Spectral => Ok(FilterCode::Spectral(self.pair())),
            FilterProtocol::Legacy => self
                .legacy()
                .map(FilterCode::Legacy)
                .ok_or_else(|| LinkError::InvalidFilterCode { code: self.to_string() }),
        }
    }

    /// True when both codes put the wheel in the same physical state.
    pub fn same_position(self, other: FilterCode) -> bool {
        self.pair() == other.pair()
    }
}

impl fmt::Display for FilterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterCode::Legacy(filter) => write!(f, "{}", filter.letter()),
            FilterCode::Spectral(pair) => write!(f, "{}", pair),
        }
    }
}

impl From<LegacyFilter> for FilterCode {
    fn from(filter: LegacyFilter) -> Self {
        FilterCode::Legacy(filter)
    }
}

impl From<ColorPair> for FilterCode {
    fn from(pair: ColorPair) -> Self {
        FilterCode::Spectral(pair)
    }
}

/// Last known state of the filter wheel.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    /// Code as last reported or assumed
    pub code: FilterCode,
    /// Servo angle reported by legacy firmware
    pub servo_degrees: Option<u16>,
    /// A move is in progress
    pub changing: bool,
    /// When the wheel last settled on a new code
    pub last_change: SystemTime,
}

impl FilterState {
    pub fn new(code: FilterCode) -> Self {
        Self { code, servo_degrees: code.servo_degrees(), changing: false, last_change: SystemTime::now() }
    }

    pub fn pair(&self) -> ColorPair {
        self.code.pair()
    }

    /// Human readable status line.
    pub fn status_text(&self) -> String {
        if self.changing {
            return "Changing...".to_string();
        }
        match self.code.legacy() {
            Some(filter) => format!("Active: {}", filter.description()),
            None => format!("Active: {}", self.pair().mixed_color()),
        }
    }

    /// Mark the wheel as settled on `code`.
    pub(crate) fn settle(&mut self, code: FilterCode, servo_degrees: Option<u16>, at: SystemTime) {
        self.code = code;
        self.servo_degrees = servo_degrees.or_else(|| code.servo_degrees());
        self.changing = false;
        self.last_change = at;
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(FilterCode::Legacy(LegacyFilter::Normal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_to_pair_table() {
        let expected = [
            ('N', (0, 0)),
            ('R', (1, 0)),
            ('G', (2, 0)),
            ('B', (3, 0)),
            ('Y', (1, 2)),
            ('P', (1, 3)),
            ('C', (2, 3)),
            ('M', (1, 1)),
            ('F', (2, 2)),
        ];
        for (letter, digits) in expected {
            let filter = LegacyFilter::from_letter(letter).unwrap();
            assert_eq!(filter.pair().digits(), digits, "letter {letter}");
        }
    }

    #[test]
    fn pair_to_letter_is_inverse() {
        for filter in LegacyFilter::ALL {
            assert_eq!(LegacyFilter::from_pair(filter.pair()), Some(filter));
        }
        let unmapped = ColorPair::from_digits(3, 1).unwrap();
        assert_eq!(LegacyFilter::from_pair(unmapped), None);
    }

    #[test]
    fn servo_degrees_table() {
        let degrees: Vec<u16> = LegacyFilter::ALL.iter().map(|f| f.servo_degrees()).collect();
        assert_eq!(degrees, vec![0, 45, 90, 135, 180, 225, 270, 315, 360]);
    }

    #[test]
    fn letters_are_case_insensitive() {
        assert_eq!(LegacyFilter::from_letter('g').unwrap(), LegacyFilter::Green);
        assert!(matches!(
            LegacyFilter::from_letter('x'),
            Err(LinkError::InvalidFilterCode { .. })
        ));
    }

    #[test]
    fn color_digits_are_range_checked() {
        assert!(ColorPair::from_digits(3, 0).is_ok());
        assert!(matches!(
            ColorPair::from_digits(1, 4),
            Err(LinkError::InvalidColorDigit { digit: 4 })
        ));
        assert!(ColorPair::parse("1").is_err());
        assert!(ColorPair::parse("1a").is_err());
        assert_eq!(ColorPair::parse(" 13 ").unwrap().to_string(), "13");
    }

    #[test]
    fn filter_code_parses_both_dialects() {
        assert_eq!(FilterCode::parse("p").unwrap(), FilterCode::Legacy(LegacyFilter::Purple));
        let spectral = FilterCode::parse("13").unwrap();
        assert_eq!(spectral, FilterCode::Spectral(ColorPair::new(Color::Red, Color::Blue)));
        assert!(spectral.same_position(FilterCode::Legacy(LegacyFilter::Purple)));
        assert!(FilterCode::parse("").is_err());
        assert!(FilterCode::parse("Q").is_err());
    }

    #[test]
    fn protocol_conversion() {
        let purple = FilterCode::Legacy(LegacyFilter::Purple);
        assert_eq!(purple.for_protocol(FilterProtocol::Spectral).unwrap().to_string(), "13");

        let cyan = FilterCode::parse("23").unwrap();
        assert_eq!(
            cyan.for_protocol(FilterProtocol::Legacy).unwrap(),
            FilterCode::Legacy(LegacyFilter::Cyan)
        );

        let reversed = FilterCode::parse("32").unwrap();
        assert!(reversed.for_protocol(FilterProtocol::Legacy).is_err());
    }

    #[test]
    fn mixed_colors() {
        let mix = |code: &str| ColorPair::parse(code).unwrap().mixed_color();
        assert_eq!(mix("00"), "Transparent");
        assert_eq!(mix("02"), "Green");
        assert_eq!(mix("30"), "Blue");
        assert_eq!(mix("11"), "Red");
        assert_eq!(mix("12"), "#FF8800");
        assert_eq!(mix("31"), "#FF00FF");
        assert_eq!(mix("23"), "#00FFFF");
    }

    #[test]
    fn status_text_reflects_motion() {
        let mut state = FilterState::default();
        assert_eq!(state.status_text(), "Active: Normal");
        state.changing = true;
        assert_eq!(state.status_text(), "Changing...");
    }
}
