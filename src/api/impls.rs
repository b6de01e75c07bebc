use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use anyhow::bail;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::*;

impl Display for RaceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Ended => "Ended",
            Self::Aborted => "Aborted",
        };
        write!(f, "{}", output)
    }
}
impl FromStr for RaceState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(Self::Idle),
            "Running" => Ok(Self::Running),
            "Ended" => Ok(Self::Ended),
            "Aborted" => Ok(Self::Aborted),
            e => bail!("Couldn't deserialize to RaceState: {}", e),
        }
    }
}
impl Display for Winner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Player {
                name, prediction, ..
            } => write!(f, "{} (predicted ${:.2})", name, prediction),
            Self::NoWinner => write!(f, "No winner"),
        }
    }
}
impl Display for CryptoAsset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.symbol.to_uppercase())
    }
}

impl Winner {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Player { name, .. } => Some(name.as_str()),
            Self::NoWinner => None,
        }
    }
}

impl Room {
    pub fn new(
        code: RoomCode,
        host: PlayerName,
        asset: CryptoAsset,
        duration_sec: u32,
    ) -> Self {
        Self {
            code,
            players: vec![Player {
                name: host.clone(),
                prediction: None,
            }],
            host,
            asset,
            started: false,
            start_time: None,
            duration_sec,
            outcome: None,
            samples: vec![],
            aborted: None,
            version: 0,
        }
    }
    pub fn race_state(&self) -> RaceState {
        if self.aborted.is_some() {
            RaceState::Aborted
        } else if self.outcome.is_some() {
            RaceState::Ended
        } else if self.started {
            RaceState::Running
        } else {
            RaceState::Idle
        }
    }
    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.name == name)
    }
    pub fn player_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.name == name)
    }
    /// Seconds left on the countdown as seen by an observer at `now`.
    pub fn time_left(&self, now: DateTime<Utc>) -> u32 {
        match (self.race_state(), self.start_time) {
            (RaceState::Idle, _) => self.duration_sec,
            (RaceState::Running, Some(start)) => {
                let elapsed = (now - start).num_seconds().max(0);
                (self.duration_sec as i64 - elapsed).max(0) as u32
            }
            _ => 0,
        }
    }
    pub fn initial_price(&self) -> Option<Price> {
        self.samples.first().map(|sample| sample.price)
    }
    pub fn current_price(&self) -> Option<Price> {
        self.samples.last().map(|sample| sample.price)
    }
}

/// A price has to be finite, non-negative and fit a `Decimal` so winner
/// distances can be computed for it.
pub fn is_valid_price(price: Price) -> bool {
    price.is_finite() && price >= 0.0 && Decimal::from_f64(price).is_some()
}
