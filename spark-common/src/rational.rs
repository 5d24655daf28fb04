use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

use crate::config::ConfigError;

/// Exact rational number used for simulation time (tick * time step).
///
/// Always stored normalised: positive denominator, numerator and denominator coprime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rational {
    num: i64,
    den: i64,
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Rational {
    pub const ZERO: Rational = Rational { num: 0, den: 1 };
    pub const ONE: Rational = Rational { num: 1, den: 1 };

    /// Panics on a zero denominator.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "rational with zero denominator");
        let g = gcd(num, den).max(1);
        let sign = if den < 0 { -1 } else { 1 };
        Rational { num: sign * num / g, den: sign * den / g }
    }

    pub fn from_integer(value: i64) -> Self {
        Rational { num: value, den: 1 }
    }

    pub fn numerator(&self) -> i64 {
        self.num
    }

    pub fn denominator(&self) -> i64 {
        self.den
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn is_positive(&self) -> bool {
        self.num > 0
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// `self * n` for a tick count.
    pub fn times(&self, n: u64) -> Rational {
        *self * Rational::from_integer(n as i64)
    }

    fn from_wide(num: i128, den: i128) -> Self {
        let mut a = num.abs();
        let mut b = den.abs();
        while b != 0 {
            let t = a % b;
            a = b;
            b = t;
        }
        let g = a.max(1);
        let sign = if den < 0 { -1 } else { 1 };
        Rational {
            num: (sign * num / g) as i64,
            den: (sign * den / g) as i64,
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::ONE
    }
}

impl Add for Rational {
    type Output = Rational;
    fn add(self, other: Rational) -> Rational {
        Rational::from_wide(
            self.num as i128 * other.den as i128 + other.num as i128 * self.den as i128,
            self.den as i128 * other.den as i128,
        )
    }
}

impl Sub for Rational {
    type Output = Rational;
    fn sub(self, other: Rational) -> Rational {
        Rational::from_wide(
            self.num as i128 * other.den as i128 - other.num as i128 * self.den as i128,
            self.den as i128 * other.den as i128,
        )
    }
}

impl Mul for Rational {
    type Output = Rational;
    fn mul(self, other: Rational) -> Rational {
        Rational::from_wide(
            self.num as i128 * other.num as i128,
            self.den as i128 * other.den as i128,
        )
    }
}

impl Div for Rational {
    type Output = Rational;
    /// Panics when dividing by zero.
    fn div(self, other: Rational) -> Rational {
        assert!(other.num != 0, "rational division by zero");
        Rational::from_wide(
            self.num as i128 * other.den as i128,
            self.den as i128 * other.num as i128,
        )
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as i128 * other.den as i128).cmp(&(other.num as i128 * self.den as i128))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for Rational {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::InvalidRational(s.to_string());
        let trimmed = s.trim();
        match trimmed.split_once('/') {
            Some((n, d)) => {
                let num: i64 = n.trim().parse().map_err(|_| bad())?;
                let den: i64 = d.trim().parse().map_err(|_| bad())?;
                if den == 0 {
                    return Err(bad());
                }
                Ok(Rational::new(num, den))
            }
            None => trimmed.parse::<i64>().map(Rational::from_integer).map_err(|_| bad()),
        }
    }
}

impl TryFrom<String> for Rational {
    type Error = ConfigError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rational> for String {
    fn from(value: Rational) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_sign_and_gcd() {
        let r = Rational::new(6, -8);
        assert_eq!(r.numerator(), -3);
        assert_eq!(r.denominator(), 4);
    }

    #[test]
    fn tenths_accumulate_exactly() {
        let dt: Rational = "1/10".parse().unwrap();
        let mut t = Rational::ZERO;
        for _ in 0..10 {
            t = t + dt;
        }
        assert_eq!(t, Rational::ONE);
        assert_eq!(dt.times(25), Rational::new(5, 2));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("1/0".parse::<Rational>().is_err());
        assert!("abc".parse::<Rational>().is_err());
        assert_eq!("7".parse::<Rational>().unwrap(), Rational::from_integer(7));
    }

    #[test]
    fn ordering_uses_cross_products() {
        assert!(Rational::new(1, 3) < Rational::new(1, 2));
        assert_eq!(Rational::new(3, 4) / Rational::new(3, 8), Rational::from_integer(2));
    }
}
