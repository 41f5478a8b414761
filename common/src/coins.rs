use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Error, Formatter};
use std::str::FromStr;
use thiserror::Error;

use crate::config::{COIN_DECIMALS, COIN_VALUE};

/// Token amount counted in 10^-8 units.
///
/// Rendered with all eight fractional digits ("100.00000000") so amounts
/// keep their trailing zeros through hash preimages and the wire. The u64
/// domain bounds every amount to twenty significant digits. Amounts cannot
/// be negative; arithmetic is checked and exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coins(u64);

#[derive(Debug, Error, PartialEq)]
pub enum CoinsError {
    #[error("malformed amount: {0}")]
    Malformed(String),
    #[error("too many fractional digits: {0}")]
    TooPrecise(String),
    #[error("amount out of range: {0}")]
    OutOfRange(String),
}

impl Coins {
    pub const ZERO: Coins = Coins(0);

    pub const fn from_units(units: u64) -> Self {
        Coins(units)
    }

    pub const fn units(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Coins) -> Option<Coins> {
        self.0.checked_add(other.0).map(Coins)
    }

    /// None when the balance would go negative.
    pub fn checked_sub(self, other: Coins) -> Option<Coins> {
        self.0.checked_sub(other.0).map(Coins)
    }
}

impl Display for Coins {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}.{:08}", self.0 / COIN_VALUE, self.0 % COIN_VALUE)
    }
}

impl FromStr for Coins {
    type Err = CoinsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (whole, fraction) = match s.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (s, ""),
        };
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !digits(whole) || !digits(fraction) {
            return Err(CoinsError::Malformed(s.to_string()));
        }
        if fraction.len() > COIN_DECIMALS as usize {
            return Err(CoinsError::TooPrecise(s.to_string()));
        }

        let whole: u64 = whole
            .parse()
            .map_err(|_| CoinsError::OutOfRange(s.to_string()))?;
        let fraction_units = if fraction.is_empty() {
            0
        } else {
            let parsed: u64 = fraction
                .parse()
                .map_err(|_| CoinsError::Malformed(s.to_string()))?;
            parsed * 10u64.pow(COIN_DECIMALS - fraction.len() as u32)
        };

        whole
            .checked_mul(COIN_VALUE)
            .and_then(|units| units.checked_add(fraction_units))
            .map(Coins)
            .ok_or_else(|| CoinsError::OutOfRange(s.to_string()))
    }
}

impl Serialize for Coins {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'a> Deserialize<'a> for Coins {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let amount = String::deserialize(deserializer)?;
        amount.parse().map_err(SerdeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BLOCK_REWARD;

    #[test]
    fn test_display_keeps_trailing_zeros() {
        assert_eq!(BLOCK_REWARD.to_string(), "100.00000000");
        assert_eq!(Coins::from_units(1).to_string(), "0.00000001");
        assert_eq!(Coins::ZERO.to_string(), "0.00000000");
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!("100.00000000".parse::<Coins>().unwrap(), BLOCK_REWARD);
        assert_eq!("100".parse::<Coins>().unwrap(), BLOCK_REWARD);
        assert_eq!("100.5".parse::<Coins>().unwrap(), Coins::from_units(10_050_000_000));
        assert_eq!("0.00000001".parse::<Coins>().unwrap(), Coins::from_units(1));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("".parse::<Coins>(), Err(CoinsError::Malformed(_))));
        assert!(matches!(".5".parse::<Coins>(), Err(CoinsError::Malformed(_))));
        assert!(matches!("-1".parse::<Coins>(), Err(CoinsError::Malformed(_))));
        assert!(matches!("1e8".parse::<Coins>(), Err(CoinsError::Malformed(_))));
        assert!(matches!(
            "1.000000001".parse::<Coins>(),
            Err(CoinsError::TooPrecise(_))
        ));
        assert!(matches!(
            "99999999999999999999999".parse::<Coins>(),
            Err(CoinsError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_checked_arithmetic() {
        let five = "5".parse::<Coins>().unwrap();
        let three = "3".parse::<Coins>().unwrap();
        assert_eq!(five.checked_sub(three).unwrap().to_string(), "2.00000000");
        assert_eq!(three.checked_sub(five), None);
        assert_eq!(Coins::from_units(u64::MAX).checked_add(Coins::from_units(1)), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let amount: Coins = "42.12345678".parse().unwrap();
        let encoded = serde_json::to_string(&amount).unwrap();
        assert_eq!(encoded, "\"42.12345678\"");
        let decoded: Coins = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, amount);
    }
}
