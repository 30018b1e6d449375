//! Conversion of a nominal contribution into a per-period cash amount

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::Display;
use std::str::FromStr;

/// How often the nominal contribution is paid in.
///
/// Labels that match none of the variants fall back to [`Frequency::Monthly`],
/// so converting from a string never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Annually,
}

impl Frequency {
    pub const ALL: [Frequency; 4] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Annually,
    ];
}

impl From<&str> for Frequency {
    fn from(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            "annually" | "annual" | "yearly" => Frequency::Annually,
            // Monthly, and anything unrecognised
            _ => Frequency::Monthly,
        }
    }
}

impl From<String> for Frequency {
    fn from(label: String) -> Self {
        Frequency::from(label.as_str())
    }
}

impl From<Frequency> for String {
    fn from(frequency: Frequency) -> Self {
        frequency.to_string()
    }
}

impl FromStr for Frequency {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Frequency::from(s))
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Frequency::Daily => "Daily",
                Frequency::Weekly => "Weekly",
                Frequency::Monthly => "Monthly",
                Frequency::Annually => "Annually",
            }
        )
    }
}

/// Converts `amount`, paid at `frequency`, into the cash added on every row of
/// the price series.
///
/// The factors approximate a month: 30 daily or 4.33 weekly payments, or a
/// twelfth of an annual one. The result does not depend on the sampling
/// interval of the data.
pub fn normalize(amount: f64, frequency: Frequency) -> f64 {
    match frequency {
        Frequency::Daily => amount * 30.0,
        Frequency::Weekly => amount * 4.33,
        Frequency::Annually => amount / 12.0,
        Frequency::Monthly => amount,
    }
}
