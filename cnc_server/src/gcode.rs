//! G-code line parser.
//!
//! Recognizes the small command subset the turning concept understands:
//!
//! | Token            | Directive                  | Matching                         |
//! |------------------|----------------------------|----------------------------------|
//! | `G00` / `G01`    | `Move`                     | Line start, case-sensitive       |
//! | `X<num>` `Z<num>`| axis targets of the `Move` | After the G code, X before Z     |
//! | `S<num>`         | `SpindleSpeed`             | Anywhere, case-insensitive       |
//! | `F<num>`         | `FeedRate`                 | Anywhere, case-insensitive       |
//!
//! Spindle and feed tokens are searched independently of the move, so one
//! line can carry all three directives. A token whose number does not
//! parse is treated as absent; nothing on a line can fail the program.

use regex::Regex;
use std::sync::LazyLock;

/// Move at line start: G code, then optional X, then optional Z.
static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(G0[01])\s*(?:X([-+]?[0-9]*\.?[0-9]+))?\s*(?:Z([-+]?[0-9]*\.?[0-9]+))?")
        .expect("move pattern is valid")
});

static SPINDLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)S([-+]?[0-9]*\.?[0-9]+)").expect("spindle pattern is valid")
});

static FEED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)F([-+]?[0-9]*\.?[0-9]+)").expect("feed pattern is valid")
});

/// Motion G code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GCode {
    /// Rapid positioning
    G00,
    /// Linear interpolation at feed
    G01,
}

impl GCode {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "G00" => Some(Self::G00),
            "G01" => Some(Self::G01),
            _ => None,
        }
    }
}

/// One intent extracted from a line.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Absolute move of one or both axes.
    Move {
        /// Motion code
        g_code: GCode,
        /// X target, if given
        x: Option<f64>,
        /// Z target, if given
        z: Option<f64>,
    },
    /// Spindle speed setpoint.
    SpindleSpeed(f64),
    /// Feed rate setpoint.
    FeedRate(f64),
}

/// Classification of one program line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// Blank, `(comment)` or `%` delimiter: no effect and no pacing.
    Skipped,
    /// Executable line with zero or more directives, in the order
    /// move, spindle speed, feed rate.
    Executable(Vec<Directive>),
}

impl ParsedLine {
    /// Directives of an executable line; empty for skipped lines.
    pub fn directives(&self) -> &[Directive] {
        match self {
            Self::Skipped => &[],
            Self::Executable(d) => d,
        }
    }
}

/// Parse one program line.
pub fn parse_line(raw: &str) -> ParsedLine {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('(') || line.starts_with('%') {
        return ParsedLine::Skipped;
    }

    let mut directives = Vec::with_capacity(3);

    if let Some(caps) = MOVE_RE.captures(line) {
        if let Some(g_code) = caps.get(1).and_then(|m| GCode::from_token(m.as_str())) {
            directives.push(Directive::Move {
                g_code,
                x: caps.get(2).and_then(|m| parse_number(m.as_str())),
                z: caps.get(3).and_then(|m| parse_number(m.as_str())),
            });
        }
    }

    if let Some(speed) = find_value(&SPINDLE_RE, line) {
        directives.push(Directive::SpindleSpeed(speed));
    }
    if let Some(feed) = find_value(&FEED_RE, line) {
        directives.push(Directive::FeedRate(feed));
    }

    ParsedLine::Executable(directives)
}

/// Parse every line of a program, in order.
pub fn parse_program(text: &str) -> impl Iterator<Item = ParsedLine> + '_ {
    text.lines().map(parse_line)
}

fn find_value(re: &Regex, line: &str) -> Option<f64> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_number(m.as_str()))
}

fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}
