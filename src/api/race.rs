use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type RoomCode = String;
pub type PlayerName = String;
pub type HostToken = String;
pub type Price = f64;
/// Whole seconds since the race started.
pub type Elapsed = u32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CryptoAsset {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub image: Option<String>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub name: PlayerName,
    pub prediction: Option<Price>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub time: Elapsed,
    pub price: Price,
    pub timestamp: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Winner {
    Player {
        name: PlayerName,
        prediction: Price,
        distance: Decimal,
    },
    NoWinner,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceOutcome {
    pub winner: Winner,
    pub final_price: Price,
    pub end_time: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub code: RoomCode,
    pub host: PlayerName,
    pub players: Vec<Player>,
    pub asset: CryptoAsset,
    pub started: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_sec: u32,
    pub outcome: Option<RaceOutcome>,
    pub samples: Vec<PriceSample>,
    pub aborted: Option<String>,
    /// Bumped by the store on every write.
    #[serde(default)]
    pub version: i64,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RaceState {
    Idle,
    Running,
    Ended,
    Aborted,
}
