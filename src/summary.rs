use std::fmt;

use crate::error::{ScrapeError, ScrapeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Plain,
    Percent,
}

impl Unit {
    fn label(self) -> &'static str {
        match self {
            Unit::Plain => "plain",
            Unit::Percent => "percentage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatValue {
    pub magnitude: f64,
    pub unit: Unit,
}

impl StatValue {
    pub fn parse(raw: &str) -> ScrapeResult<Self> {
        let trimmed = raw.trim();
        let (number, unit) = match trimmed.strip_suffix('%') {
            Some(rest) => (rest.trim_end(), Unit::Percent),
            None => (trimmed, Unit::Plain),
        };
        let magnitude = number
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ScrapeError::MalformedValue {
                value: raw.to_string(),
            })?;
        Ok(Self { magnitude, unit })
    }
}

impl From<f64> for StatValue {
    fn from(magnitude: f64) -> Self {
        Self {
            magnitude,
            unit: Unit::Plain,
        }
    }
}

pub trait RawStat {
    fn to_stat_value(&self) -> ScrapeResult<StatValue>;
    fn describe(&self) -> String;
}

impl RawStat for str {
    fn to_stat_value(&self) -> ScrapeResult<StatValue> {
        StatValue::parse(self)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl RawStat for String {
    fn to_stat_value(&self) -> ScrapeResult<StatValue> {
        StatValue::parse(self)
    }

    fn describe(&self) -> String {
        self.clone()
    }
}

impl RawStat for &str {
    fn to_stat_value(&self) -> ScrapeResult<StatValue> {
        StatValue::parse(self)
    }

    fn describe(&self) -> String {
        (*self).to_string()
    }
}

impl RawStat for f64 {
    fn to_stat_value(&self) -> ScrapeResult<StatValue> {
        if self.is_finite() {
            Ok(StatValue::from(*self))
        } else {
            Err(ScrapeError::MalformedValue {
                value: self.to_string(),
            })
        }
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl RawStat for i64 {
    fn to_stat_value(&self) -> ScrapeResult<StatValue> {
        Ok(StatValue::from(*self as f64))
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericSummary {
    pub minimum: f64,
    pub maximum: f64,
    /// Already rounded to two decimals.
    pub average: f64,
    pub unit: Unit,
}

impl NumericSummary {
    pub fn minimum_display(&self) -> String {
        with_unit(format!("{}", self.minimum), self.unit)
    }

    pub fn maximum_display(&self) -> String {
        with_unit(format!("{}", self.maximum), self.unit)
    }

    pub fn average_display(&self) -> String {
        with_unit(format!("{:.2}", self.average), self.unit)
    }
}

impl fmt::Display for NumericSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min {} / avg {} / max {}",
            self.minimum_display(),
            self.average_display(),
            self.maximum_display()
        )
    }
}

fn with_unit(number: String, unit: Unit) -> String {
    match unit {
        Unit::Plain => number,
        Unit::Percent => format!("{number}%"),
    }
}

/// The unit is a property of the whole sequence: the first value fixes it and
/// any later value with a different marker is rejected.
pub fn summarize<T: RawStat + ?Sized>(values: &[&T]) -> ScrapeResult<NumericSummary> {
    summarize_iter(values.iter().copied())
}

pub fn summarize_strings<S: AsRef<str>>(values: &[S]) -> ScrapeResult<NumericSummary> {
    summarize_iter(values.iter().map(|v| AsRef::<str>::as_ref(v)))
}

fn summarize_iter<'a, T, I>(values: I) -> ScrapeResult<NumericSummary>
where
    T: RawStat + ?Sized + 'a,
    I: Iterator<Item = &'a T>,
{
    let mut unit: Option<Unit> = None;
    let mut minimum = f64::INFINITY;
    let mut maximum = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut count = 0usize;

    for raw in values {
        let value = raw.to_stat_value()?;
        match unit {
            None => unit = Some(value.unit),
            Some(expected) if expected != value.unit => {
                return Err(ScrapeError::InconsistentUnits {
                    value: raw.describe(),
                    expected: expected.label(),
                });
            }
            Some(_) => {}
        }
        minimum = minimum.min(value.magnitude);
        maximum = maximum.max(value.magnitude);
        sum += value.magnitude;
        count += 1;
    }

    let Some(unit) = unit else {
        return Err(ScrapeError::EmptyInput);
    };
    // Rounding can step just outside the observed range for 3+ decimal inputs.
    let average = round2(sum / count as f64).clamp(minimum, maximum);
    Ok(NumericSummary {
        minimum,
        maximum,
        average,
        unit,
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
