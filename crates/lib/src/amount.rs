use crate::ICurrency;
use std::{fmt, str::FromStr};
use strum_macros::{Display, EnumString, EnumVariantNames};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount `{0}` is not of the form amount::unit::currency")]
    Malformed(String),
    #[error("Unknown amount unit `{0}`")]
    UnknownUnit(String),
    #[error(transparent)]
    InvalidAmount(#[from] std::num::ParseIntError),
    #[error("Converting {amount} from {from} to {to} overflows")]
    Overflow { amount: i64, from: Unit, to: Unit },
}

/// Subunit an integer amount is expressed in.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumVariantNames,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    MillionthCent,
    TenThousandthCent,
    ThousandthCent,
    #[default]
    #[strum(to_string = "HUNDREDTH_CENT", serialize = "DEFAULT")]
    HundredthCent,
    WholeCent,
    WholeCurrency,
}

impl Unit {
    /// Number of subunits in one whole unit of currency.
    pub const fn divisor(self) -> i64 {
        match self {
            Unit::MillionthCent => 100_000_000,
            Unit::TenThousandthCent => 1_000_000,
            Unit::ThousandthCent => 100_000,
            Unit::HundredthCent => 10_000,
            Unit::WholeCent => 100,
            Unit::WholeCurrency => 1,
        }
    }

    /// `amount` of this unit as a whole-currency fixed point value, `None` on overflow.
    pub fn to_currency(self, amount: i64) -> Option<ICurrency> {
        ICurrency::checked_from_num(amount)?.checked_div_int(self.divisor())
    }
}

/// Money as an integer count of `unit`s, the way the backend sends it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonetaryAmount {
    pub amount: i64,
    pub unit: Unit,
    pub currency: String,
}

impl MonetaryAmount {
    pub fn new(amount: i64, unit: Unit, currency: impl Into<String>) -> Self {
        Self {
            amount,
            unit,
            currency: currency.into(),
        }
    }

    /// Re-expresses the amount in another unit. Converting to a coarser unit
    /// truncates toward zero.
    pub fn convert_to(&self, unit: Unit) -> Result<Self, AmountError> {
        let (from, to) = (self.unit.divisor(), unit.divisor());
        let amount = if to >= from {
            self.amount.checked_mul(to / from)
        } else {
            Some(self.amount / (from / to))
        }
        .ok_or(AmountError::Overflow {
            amount: self.amount,
            from: self.unit,
            to: unit,
        })?;

        Ok(Self::new(amount, unit, self.currency.clone()))
    }

    pub fn to_currency(&self) -> Option<ICurrency> {
        self.unit.to_currency(self.amount)
    }

    /// Currency symbol followed by the value with two decimals, e.g. `R1,025.00`.
    pub fn standard_format(&self) -> String {
        format!(
            "{}{}",
            currency_symbol(&self.currency),
            format_value(self.amount, self.unit, 2)
        )
    }
}

/// Parses the backend wire form `10000::HUNDREDTH_CENT::ZAR`.
impl FromStr for MonetaryAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split("::");
        let (amount, unit, currency) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(amount), Some(unit), Some(currency), None) if !currency.is_empty() => {
                (amount, unit, currency)
            }
            _ => return Err(AmountError::Malformed(s.to_string())),
        };
        let unit = unit
            .parse()
            .map_err(|_| AmountError::UnknownUnit(unit.to_string()))?;

        Ok(Self::new(amount.parse()?, unit, currency))
    }
}

impl fmt::Display for MonetaryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.amount, self.unit, self.currency)
    }
}

pub fn currency_symbol(currency: &str) -> &'static str {
    match currency {
        "ZAR" => "R",
        _ => "?",
    }
}

/// Formats `value` subunits as whole currency with `decimals` places and comma
/// thousands separators. Rounds half away from zero.
pub fn format_value(value: i64, unit: Unit, decimals: u32) -> String {
    let divisor = i128::from(unit.divisor());
    let scale = 10i128.pow(decimals);
    let scaled = i128::from(value) * scale;

    let mut rounded = scaled / divisor;
    if (scaled % divisor).abs() * 2 >= divisor {
        rounded += scaled.signum();
    }

    let magnitude = rounded.unsigned_abs();
    let whole = magnitude / scale as u128;
    let fraction = magnitude % scale as u128;

    let mut out = String::new();
    if rounded < 0 {
        out.push('-');
    }
    let mut buf = itoa::Buffer::new();
    let digits = buf.format(whole);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    if decimals > 0 {
        out.push('.');
        let fraction = buf.format(fraction);
        out.extend(std::iter::repeat('0').take(decimals as usize - fraction.len()));
        out.push_str(fraction);
    }
    out
}
