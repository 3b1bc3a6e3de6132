use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseAmountError {
    /// Unable to parse decimal string.
    #[error("Unable to parse decimal string")]
    Decimal(#[from] rust_decimal::Error),
}

/// A quantity of cryptocurrency, e.g. an amount of BTC bought or sold.
///
/// Wraps a 96-bit decimal (28 significant digits). All arithmetic between
/// `CryptoAmount`s is exact; rounding happens only through [`round_dp`],
/// which report generators call at formatting time.
///
/// [`round_dp`]: CryptoAmount::round_dp
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CryptoAmount(Decimal);

/// A fiat value in the configured currency.
///
/// Spot prices are `FiatAmount`s (fiat per unit of crypto), so
/// `CryptoAmount * FiatAmount` yields a `FiatAmount`. There is no other way
/// to cross between the two amount types.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FiatAmount(Decimal);

macro_rules! impl_amount {
    ($name:ident) => {
        impl $name {
            pub const ZERO: Self = Self(Decimal::ZERO);
            pub const ONE: Self = Self(Decimal::ONE);
            pub const HUNDRED: Self = Self(Decimal::ONE_HUNDRED);

            pub(crate) const fn from_decimal(inner: Decimal) -> Self {
                Self(inner)
            }

            pub(crate) fn into_decimal(self) -> Decimal {
                self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            pub fn is_negative(&self) -> bool {
                self.0.is_sign_negative() && !self.0.is_zero()
            }

            /// Round to `dp` decimal places with banker's rounding.
            pub fn round_dp(self, dp: u32) -> Self {
                Self(
                    self.0
                        .round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven),
                )
            }

            /// The exact ratio `self / whole`, as a bare decimal.
            ///
            /// Division is the only operation that can lose precision, so it
            /// is confined to ratio computations (fractions and averages) and
            /// never fed back into balance arithmetic.
            pub fn ratio(self, whole: Self) -> Decimal {
                self.0 / whole.0
            }

            /// `self / whole`, scaled to a percentage.
            pub fn fraction_percent(self, whole: Self) -> Decimal {
                self.0 / whole.0 * Decimal::ONE_HUNDRED
            }
        }

        impl Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $name {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl Neg for $name {
            type Output = Self;

            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|amount| amount.0).sum())
            }
        }

        impl Mul<Decimal> for $name {
            type Output = Self;

            fn mul(self, rhs: Decimal) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(Decimal::from(value))
            }
        }

        impl FromStr for $name {
            type Err = ParseAmountError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Decimal::from_str_exact(s.trim())?))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.normalize().fmt(f)
            }
        }
    };
}

impl_amount!(CryptoAmount);
impl_amount!(FiatAmount);

impl Mul<FiatAmount> for CryptoAmount {
    type Output = FiatAmount;

    /// Value a crypto quantity at a unit spot price.
    fn mul(self, price: FiatAmount) -> Self::Output {
        FiatAmount(self.0 * price.0)
    }
}

impl Div<CryptoAmount> for FiatAmount {
    type Output = FiatAmount;

    /// Price per unit: total fiat value over total crypto volume.
    fn div(self, volume: CryptoAmount) -> Self::Output {
        FiatAmount(self.0 / volume.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn crypto(s: &str) -> CryptoAmount {
        s.parse().unwrap()
    }

    fn fiat(s: &str) -> FiatAmount {
        s.parse().unwrap()
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = crypto("0.1");
        let b = crypto("0.2");
        assert_eq!(a + b, crypto("0.3"));
        assert_eq!(crypto("1.5") - crypto("1.5"), CryptoAmount::ZERO);

        // Repeated accumulation must not drift.
        let mut total = CryptoAmount::ZERO;
        for _ in 0..1_000 {
            total += crypto("0.001");
        }
        assert_eq!(total, CryptoAmount::ONE);
    }

    #[test]
    fn crypto_times_price_is_fiat() {
        assert_eq!(crypto("1.5") * fiat("30000"), fiat("45000"));
        assert_eq!(crypto("0.01") * fiat("15000"), fiat("150"));
    }

    #[test]
    fn bankers_rounding() {
        assert_eq!(fiat("2.5").round_dp(0), fiat("2"));
        assert_eq!(fiat("3.5").round_dp(0), fiat("4"));
        assert_eq!(fiat("2.345").round_dp(2), fiat("2.34"));
        assert_eq!(fiat("2.355").round_dp(2), fiat("2.36"));
    }

    #[test]
    fn fractions() {
        assert_eq!(
            crypto("0.5").fraction_percent(crypto("2")),
            Decimal::from(25)
        );
        assert_eq!(crypto("1").ratio(crypto("4")), Decimal::new(25, 2));
    }

    #[test]
    fn ordering_is_total() {
        let mut amounts = vec![crypto("3"), crypto("-1"), crypto("0.5")];
        amounts.sort();
        assert_eq!(amounts, vec![crypto("-1"), crypto("0.5"), crypto("3")]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("1.2.3".parse::<CryptoAmount>().is_err());
        assert!("abc".parse::<FiatAmount>().is_err());
    }

    #[test]
    fn display_normalizes() {
        assert_eq!(crypto("1.2300").to_string(), "1.23");
        assert_eq!(fiat("0.0").to_string(), "0");
    }
}
