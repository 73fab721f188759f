// ABOUTME: The closed set of argument kinds a command parameter may declare, with their parsers.
// ABOUTME: Maps Rust parameter types to kind tags and converted values back to Rust types.

use chatwire_core::HashId;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Tag of the trailing string-array parameter that soaks up remaining tokens
pub const REST_TAG: &str = "string[]";

/// Every type a non-rest parameter may be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    Text,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Char,
    DateTime,
    Duration,
    Uuid,
    HashId,
}

impl ArgumentKind {
    pub const ALL: [ArgumentKind; 18] = [
        Self::Text,
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Decimal,
        Self::Char,
        Self::DateTime,
        Self::Duration,
        Self::Uuid,
        Self::HashId,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Decimal => "decimal",
            Self::Char => "char",
            Self::DateTime => "datetime",
            Self::Duration => "duration",
            Self::Uuid => "uuid",
            Self::HashId => "hashid",
        }
    }

    /// Look up a kind by tag; `None` means the type is not in the allow-list
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Convert one whitespace-free token into a value of this kind
    pub fn parse(self, token: &str) -> Result<ArgValue, ParseError> {
        let parsed = match self {
            Self::Text => Ok(ArgValue::Text(token.to_string())),
            Self::Bool => parse_bool(token).map(ArgValue::Bool),
            Self::I8 => from_str(token).map(ArgValue::I8),
            Self::I16 => from_str(token).map(ArgValue::I16),
            Self::I32 => from_str(token).map(ArgValue::I32),
            Self::I64 => from_str(token).map(ArgValue::I64),
            Self::U8 => from_str(token).map(ArgValue::U8),
            Self::U16 => from_str(token).map(ArgValue::U16),
            Self::U32 => from_str(token).map(ArgValue::U32),
            Self::U64 => from_str(token).map(ArgValue::U64),
            Self::F32 => from_str(token).map(ArgValue::F32),
            Self::F64 => from_str(token).map(ArgValue::F64),
            Self::Decimal => from_str(token).map(ArgValue::Decimal),
            Self::Char => parse_char(token).map(ArgValue::Char),
            Self::DateTime => parse_datetime(token).map(ArgValue::DateTime),
            Self::Duration => parse_duration(token).map(ArgValue::Duration),
            Self::Uuid => from_str(token).map(ArgValue::Uuid),
            Self::HashId => from_str(token).map(ArgValue::HashId),
        };
        parsed.map_err(|reason| ParseError { kind: self, reason })
    }
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a valid {kind}: {reason}")]
pub struct ParseError {
    pub kind: ArgumentKind,
    pub reason: String,
}

// =============================================================================
// Parsers
// =============================================================================

fn from_str<T>(token: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    token.parse::<T>().map_err(|e| e.to_string())
}

fn parse_bool(token: &str) -> Result<bool, String> {
    if token.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if token.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err("expected true or false".to_string())
    }
}

fn parse_char(token: &str) -> Result<char, String> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err("expected exactly one character".to_string()),
    }
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS` / `YYYY-MM-DD` read as UTC
pub fn parse_datetime(token: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(token, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| "expected an RFC 3339 timestamp or YYYY-MM-DD".to_string())
}

/// Accepts `[d.]hh:mm[:ss]`, unit form like `90s`, `5m`, `1h30m`, `250ms`,
/// or a bare number of seconds.
pub fn parse_duration(token: &str) -> Result<Duration, String> {
    if token.is_empty() {
        return Err("empty duration".to_string());
    }
    if token.contains(':') {
        parse_clock(token)
    } else {
        parse_units(token)
    }
}

fn parse_clock(token: &str) -> Result<Duration, String> {
    let (days, clock) = match token.split_once('.') {
        Some((days, clock)) if !days.contains(':') => (clock_component(days)?, clock),
        _ => (0, token),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m] => (clock_component(h)?, clock_component(m)?, 0),
        [h, m, s] => (clock_component(h)?, clock_component(m)?, clock_component(s)?),
        _ => return Err("expected [d.]hh:mm[:ss]".to_string()),
    };
    if minutes >= 60 || seconds >= 60 {
        return Err("minutes and seconds must be below 60".to_string());
    }

    days.checked_mul(86_400)
        .and_then(|total| total.checked_add(hours.checked_mul(3_600)?))
        .and_then(|total| total.checked_add(minutes * 60 + seconds))
        .map(Duration::from_secs)
        .ok_or_else(|| "duration is too large".to_string())
}

fn clock_component(part: &str) -> Result<u64, String> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{:?} is not a clock component", part));
    }
    part.parse().map_err(|e: std::num::ParseIntError| e.to_string())
}

fn parse_units(token: &str) -> Result<Duration, String> {
    if let Ok(secs) = token.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = token;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("expected a number before {:?}", rest));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|e: std::num::ParseIntError| e.to_string())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let millis_per_unit = match &rest[..unit_len] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            "" => return Err(format!("missing unit after {}", value)),
            other => return Err(format!("unknown duration unit {:?}", other)),
        };
        rest = &rest[unit_len..];

        total = value
            .checked_mul(millis_per_unit)
            .and_then(|millis| total.checked_add(Duration::from_millis(millis)))
            .ok_or_else(|| "duration is too large".to_string())?;
    }
    Ok(total)
}

// =============================================================================
// Values
// =============================================================================

/// A converted argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    DateTime(DateTime<Utc>),
    Duration(Duration),
    Uuid(Uuid),
    HashId(HashId),
}

impl ArgValue {
    pub fn kind(&self) -> ArgumentKind {
        match self {
            Self::Text(_) => ArgumentKind::Text,
            Self::Bool(_) => ArgumentKind::Bool,
            Self::I8(_) => ArgumentKind::I8,
            Self::I16(_) => ArgumentKind::I16,
            Self::I32(_) => ArgumentKind::I32,
            Self::I64(_) => ArgumentKind::I64,
            Self::U8(_) => ArgumentKind::U8,
            Self::U16(_) => ArgumentKind::U16,
            Self::U32(_) => ArgumentKind::U32,
            Self::U64(_) => ArgumentKind::U64,
            Self::F32(_) => ArgumentKind::F32,
            Self::F64(_) => ArgumentKind::F64,
            Self::Decimal(_) => ArgumentKind::Decimal,
            Self::Char(_) => ArgumentKind::Char,
            Self::DateTime(_) => ArgumentKind::DateTime,
            Self::Duration(_) => ArgumentKind::Duration,
            Self::Uuid(_) => ArgumentKind::Uuid,
            Self::HashId(_) => ArgumentKind::HashId,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => f.write_str(v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::I8(v) => write!(f, "{}", v),
            Self::I16(v) => write!(f, "{}", v),
            Self::I32(v) => write!(f, "{}", v),
            Self::I64(v) => write!(f, "{}", v),
            Self::U8(v) => write!(f, "{}", v),
            Self::U16(v) => write!(f, "{}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::U64(v) => write!(f, "{}", v),
            Self::F32(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::Decimal(v) => write!(f, "{}", v),
            Self::Char(v) => write!(f, "{}", v),
            Self::DateTime(v) => f.write_str(&v.to_rfc3339()),
            Self::Duration(v) => write!(f, "{}s", v.as_secs_f64()),
            Self::Uuid(v) => write!(f, "{}", v),
            Self::HashId(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

// =============================================================================
// Rust type mapping
// =============================================================================

/// Rust types usable as command parameters. `Option<T>` marks the parameter
/// optional, `Vec<String>` declares the rest parameter.
pub trait ArgumentType {
    const TAG: &'static str;
    const NULLABLE: bool = false;
}

/// Extract a typed value back out of a converted argument.
pub trait FromArgValue: Sized {
    fn from_arg(value: &ArgValue) -> Option<Self>;
}

macro_rules! scalar_arguments {
    ($($ty:ty => $variant:ident;)*) => {$(
        impl ArgumentType for $ty {
            const TAG: &'static str = ArgumentKind::$variant.tag();
        }

        impl FromArgValue for $ty {
            fn from_arg(value: &ArgValue) -> Option<Self> {
                match value {
                    ArgValue::$variant(v) => Some(Clone::clone(v)),
                    _ => None,
                }
            }
        }

        impl From<$ty> for ArgValue {
            fn from(value: $ty) -> Self {
                ArgValue::$variant(value)
            }
        }
    )*};
}

scalar_arguments! {
    String => Text;
    bool => Bool;
    i8 => I8;
    i16 => I16;
    i32 => I32;
    i64 => I64;
    u8 => U8;
    u16 => U16;
    u32 => U32;
    u64 => U64;
    f32 => F32;
    f64 => F64;
    Decimal => Decimal;
    char => Char;
    DateTime<Utc> => DateTime;
    Duration => Duration;
    Uuid => Uuid;
    HashId => HashId;
}

impl<T: ArgumentType> ArgumentType for Option<T> {
    const TAG: &'static str = T::TAG;
    const NULLABLE: bool = true;
}

impl ArgumentType for Vec<String> {
    const TAG: &'static str = REST_TAG;
}

/// Declared type of a parameter before the table builder validates it.
///
/// Usually produced with [`TypeTag::of`]; [`TypeTag::named`] exists for
/// declarations assembled from data, where an unknown name is reported as a
/// configuration error at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTag {
    name: Cow<'static, str>,
    nullable: bool,
}

impl TypeTag {
    pub fn of<T: ArgumentType>() -> Self {
        Self {
            name: Cow::Borrowed(T::TAG),
            nullable: T::NULLABLE,
        }
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
        }
    }

    pub fn rest() -> Self {
        Self::named(REST_TAG)
    }

    /// Mark the type as its nullable form
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_rest(&self) -> bool {
        self.name == REST_TAG
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}
