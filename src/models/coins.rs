//! Multi-denomination balances and the arithmetic the spammer performs on them.
//!
//! A [`Coins`] value is a set of `(denom, amount)` pairs, kept sorted by
//! denomination with no denomination repeated. None of the operations here
//! ever invent a denomination that was not present in their input.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use itertools::Itertools;
use num_bigint::BigUint;
use num_traits::Zero;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

/// Denominator of the random share drawn by [`Coins::random_share`].
pub const SHARE_DENOMINATOR: u32 = 10_000;

/// Largest numerator a share fraction of `1.0` can draw.
pub const MAX_SHARE_NUMERATOR: u32 = 9_999;

static COIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)([a-z][a-z0-9]{2,15})$").expect("coin regex must compile")
});

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum CoinsError {
    #[error("invalid coin expression {0:?}, expected e.g. 100rune")]
    InvalidCoin(String),

    #[error("denomination {0} appears more than once")]
    DuplicateDenom(String),

    #[error("share fraction must lie in (0, 1] and allow at least 1/10000, got {0}")]
    InvalidShareFraction(f64),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: BigUint,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: impl Into<BigUint>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.into(),
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

impl FromStr for Coin {
    type Err = CoinsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let captures = COIN_REGEX
            .captures(trimmed)
            .ok_or_else(|| CoinsError::InvalidCoin(s.to_string()))?;
        let amount = BigUint::from_str(&captures[1])
            .map_err(|_| CoinsError::InvalidCoin(s.to_string()))?;

        Ok(Self::new(&captures[2], amount))
    }
}

/// A balance: amounts keyed by denomination.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coin>", into = "Vec<Coin>")]
pub struct Coins(Vec<Coin>);

impl Coins {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Amount held in `denom`; zero when the denomination is absent.
    pub fn amount_of(&self, denom: &str) -> BigUint {
        self.0
            .iter()
            .find(|coin| coin.denom == denom)
            .map(|coin| coin.amount.clone())
            .unwrap_or_default()
    }

    /// True when every denomination holds zero (or there are none).
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|coin| coin.amount.is_zero())
    }

    /// True when non-empty and every denomination holds a positive amount.
    pub fn is_all_positive(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|coin| !coin.amount.is_zero())
    }

    /// Drops denominations holding zero.
    pub fn non_zero(self) -> Self {
        Self(
            self.0
                .into_iter()
                .filter(|coin| !coin.amount.is_zero())
                .collect(),
        )
    }

    /// Multiplies every amount by `factor`.
    ///
    /// Used to compute what funding `factor` new accounts costs in total.
    pub fn scale(&self, factor: u64) -> Self {
        let factor = BigUint::from(factor);
        Self(
            self.0
                .iter()
                .map(|coin| Coin::new(coin.denom.clone(), &coin.amount * &factor))
                .collect(),
        )
    }

    /// A random share of this balance of at most `max` of every amount.
    ///
    /// One numerator `m` is drawn uniformly from `[1, floor(9999 * max)]` and
    /// every amount becomes `amount * m / 10000`, rounded down. Sharing one
    /// numerator keeps the proportions between denominations intact. Small
    /// balances may round to zero in every denomination.
    pub fn random_share(&self, max: ShareFraction) -> Self {
        self.random_share_with(max, &mut rand::rng())
    }

    pub fn random_share_with<R: Rng + ?Sized>(&self, max: ShareFraction, rng: &mut R) -> Self {
        let numerator = rng.random_range(1..=max.max_numerator());
        self.share(numerator)
    }

    /// `amount * numerator / 10000` for every amount, rounded down.
    pub fn share(&self, numerator: u32) -> Self {
        let numerator = BigUint::from(numerator);
        let denominator = BigUint::from(SHARE_DENOMINATOR);
        Self(
            self.0
                .iter()
                .map(|coin| {
                    Coin::new(coin.denom.clone(), &coin.amount * &numerator / &denominator)
                })
                .collect(),
        )
    }

    /// True when this balance holds at least `required` in every
    /// denomination `required` names.
    pub fn is_gte(&self, required: &Coins) -> bool {
        required
            .iter()
            .all(|coin| self.amount_of(&coin.denom) >= coin.amount)
    }

    pub fn add(&self, other: &Coins) -> Self {
        let mut merged = self.to_map();
        for coin in other.iter() {
            *merged.entry(coin.denom.clone()).or_default() += &coin.amount;
        }
        Self::from_map(merged)
    }

    /// `self - other`, or `None` when some denomination would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Option<Self> {
        let mut remaining = self.to_map();
        for coin in other.iter() {
            let held = remaining.entry(coin.denom.clone()).or_default();
            if *held < coin.amount {
                return None;
            }
            *held -= &coin.amount;
        }
        Some(Self::from_map(remaining))
    }

    fn to_map(&self) -> BTreeMap<String, BigUint> {
        self.0
            .iter()
            .map(|coin| (coin.denom.clone(), coin.amount.clone()))
            .collect()
    }

    fn from_map(map: BTreeMap<String, BigUint>) -> Self {
        Self(
            map.into_iter()
                .map(|(denom, amount)| Coin::new(denom, amount))
                .collect(),
        )
    }
}

impl TryFrom<Vec<Coin>> for Coins {
    type Error = CoinsError;

    fn try_from(mut coins: Vec<Coin>) -> Result<Self, Self::Error> {
        coins.sort_by(|a, b| a.denom.cmp(&b.denom));
        if let Some((dup, _)) = coins
            .iter()
            .tuple_windows()
            .find(|(a, b)| a.denom == b.denom)
        {
            return Err(CoinsError::DuplicateDenom(dup.denom.clone()));
        }
        Ok(Self(coins))
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(coins: Coins) -> Self {
        coins.0
    }
}

impl From<Coin> for Coins {
    fn from(coin: Coin) -> Self {
        Self(vec![coin])
    }
}

impl FromStr for Coins {
    type Err = CoinsError;

    /// Parses a comma separated list such as `100rune,5bnb`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        let coins = s.split(',').map(Coin::from_str).collect::<Result<Vec<_>, _>>()?;
        Self::try_from(coins)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(","))
    }
}

/// Upper bound of the share [`Coins::random_share`] may take.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ShareFraction(f64);

impl ShareFraction {
    pub const HALF: Self = Self(0.5);
    pub const FULL: Self = Self(1.0);

    pub fn new(fraction: f64) -> Result<Self, CoinsError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(CoinsError::InvalidShareFraction(fraction));
        }
        let share = Self(fraction);
        if share.max_numerator() == 0 {
            return Err(CoinsError::InvalidShareFraction(fraction));
        }
        Ok(share)
    }

    /// `floor(9999 * fraction)`
    pub fn max_numerator(self) -> u32 {
        (f64::from(MAX_SHARE_NUMERATOR) * self.0).floor() as u32
    }
}

impl Default for ShareFraction {
    fn default() -> Self {
        Self::HALF
    }
}

impl fmt::Display for ShareFraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ShareFraction {
    type Err = CoinsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fraction =
            f64::from_str(s.trim()).map_err(|_| CoinsError::InvalidShareFraction(f64::NAN))?;
        Self::new(fraction)
    }
}
