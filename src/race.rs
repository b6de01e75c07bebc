//! Host side of a race: countdown, price sampling and winner resolution.
//!
//! Only the host's [`RaceLifecycle`] writes race state to the store. Guests
//! observe the room record and never tick.
use crate::api::*;
use crate::db::DB;
use crate::error::RaceError;
use crate::quote_source::QuoteSource;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, trace, warn};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

pub const DEFAULT_RACE_DURATION_SEC: u32 = 60;
pub const DEFAULT_MAX_QUOTE_FAILURES: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Sampled(PriceSample),
    Finished(RaceOutcome),
    /// The race isn't running, nothing happened.
    Inactive,
}

#[derive(Debug)]
pub struct RaceLifecycle {
    room: RoomCode,
    symbol: String,
    duration_sec: u32,
    time_left: u32,
    state: RaceState,
    start_time: Option<DateTime<Utc>>,
    samples: Vec<PriceSample>,
    consecutive_failures: u32,
    max_quote_failures: u32,
}

impl RaceLifecycle {
    pub fn new(room: &Room, max_quote_failures: u32) -> Self {
        Self {
            room: room.code.clone(),
            symbol: room.asset.symbol.clone(),
            duration_sec: room.duration_sec,
            time_left: room.duration_sec,
            state: RaceState::Idle,
            start_time: None,
            samples: vec![],
            consecutive_failures: 0,
            max_quote_failures: max_quote_failures.max(1),
        }
    }
    pub fn state(&self) -> RaceState {
        self.state
    }
    pub fn time_left(&self) -> u32 {
        self.time_left
    }
    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }
    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    pub async fn start(
        &mut self,
        quotes: &(dyn QuoteSource + Send + Sync),
        db: &(dyn DB + Send + Sync),
    ) -> Result<()> {
        self.expect_state(RaceState::Idle)?;
        let start_time = Utc::now();
        let price = self
            .fetch_price(quotes)
            .await
            .map_err(|e| self.quote_error(e))?;
        let sample = PriceSample {
            time: 0,
            price,
            timestamp: Utc::now(),
        };
        if !db
            .start_race(&self.room, start_time, vec![sample.clone()])
            .await
            .context("couldn't persist race start")?
        {
            return Err(match db.get_room(&self.room).await? {
                None => RaceError::RoomNotFound(self.room.clone()),
                Some(_) => RaceError::RaceAlreadyStarted(self.room.clone()),
            }
            .into());
        }
        self.start_time = Some(start_time);
        self.samples = vec![sample];
        self.time_left = self.duration_sec;
        self.consecutive_failures = 0;
        self.state = RaceState::Running;
        info!(
            "Race in room {} started at ${} for {}s",
            self.room, price, self.duration_sec
        );
        Ok(())
    }

    /// Advances the countdown by one second. The tick that would reach zero
    /// ends the race instead of sampling.
    pub async fn tick(
        &mut self,
        quotes: &(dyn QuoteSource + Send + Sync),
        db: &(dyn DB + Send + Sync),
    ) -> Result<Tick> {
        if self.state != RaceState::Running {
            return Ok(Tick::Inactive);
        }
        if self.time_left <= 1 {
            return Ok(Tick::Finished(self.end(quotes, db).await?));
        }
        let price = match self.fetch_price(quotes).await {
            Ok(price) => price,
            Err(e) => return Err(self.record_quote_failure(e, db).await),
        };
        self.consecutive_failures = 0;
        let sample = PriceSample {
            time: self.duration_sec - self.time_left + 1,
            price,
            timestamp: Utc::now(),
        };
        if !db.append_samples(&self.room, vec![sample.clone()]).await? {
            bail!("room {} refused sample at {}s", self.room, sample.time);
        }
        self.time_left -= 1;
        self.samples.push(sample.clone());
        trace!(
            "Room {}: ${} at {}s, {}s left",
            self.room,
            sample.price,
            sample.time,
            self.time_left
        );
        Ok(Tick::Sampled(sample))
    }

    pub async fn end(
        &mut self,
        quotes: &(dyn QuoteSource + Send + Sync),
        db: &(dyn DB + Send + Sync),
    ) -> Result<RaceOutcome> {
        self.expect_state(RaceState::Running)?;
        let final_price = match self.fetch_price(quotes).await {
            Ok(price) => price,
            Err(e) => return Err(self.record_quote_failure(e, db).await),
        };
        self.consecutive_failures = 0;
        let end_time = Utc::now();
        let sample = PriceSample {
            time: self.duration_sec,
            price: final_price,
            timestamp: end_time,
        };
        if !db.append_samples(&self.room, vec![sample.clone()]).await? {
            bail!("room {} refused the final sample", self.room);
        }
        self.samples.push(sample);

        let room = db
            .get_room(&self.room)
            .await?
            .ok_or(RaceError::RoomNotFound(self.room.clone()))?;
        let outcome = RaceOutcome {
            winner: resolve_winner(&room.players, final_price),
            final_price,
            end_time,
        };
        if !db.set_winner(&self.room, outcome.clone()).await? {
            warn!("Room {} already had an outcome", self.room);
        }
        self.time_left = 0;
        self.state = RaceState::Ended;
        info!(
            "Race in room {} ended at ${}, winner: {}",
            self.room, final_price, outcome.winner
        );
        Ok(outcome)
    }

    fn expect_state(&self, expected: RaceState) -> Result<(), RaceError> {
        if self.state != expected {
            return Err(RaceError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            });
        }
        Ok(())
    }
    async fn fetch_price(&self, quotes: &(dyn QuoteSource + Send + Sync)) -> Result<Price> {
        let price = quotes.fetch_price(&self.symbol).await?;
        if !is_valid_price(price) {
            bail!("quote {} for {} is out of range", price, self.symbol);
        }
        Ok(price)
    }
    fn quote_error(&self, e: anyhow::Error) -> RaceError {
        RaceError::QuoteFetch {
            symbol: self.symbol.clone(),
            reason: format!("{:#}", e),
        }
    }
    async fn record_quote_failure(
        &mut self,
        e: anyhow::Error,
        db: &(dyn DB + Send + Sync),
    ) -> anyhow::Error {
        self.consecutive_failures += 1;
        let transient = self.quote_error(e);
        if self.consecutive_failures < self.max_quote_failures {
            debug!(
                "Room {}: quote failure {}/{}: {}",
                self.room, self.consecutive_failures, self.max_quote_failures, transient
            );
            return transient.into();
        }
        let fatal = RaceError::TooManyQuoteFailures {
            room: self.room.clone(),
            failures: self.consecutive_failures,
        };
        self.state = RaceState::Aborted;
        if let Err(e) = db
            .abort_race(&self.room, format!("{} (last: {})", fatal, transient))
            .await
        {
            warn!("Couldn't persist abort of room {}: {:#}", self.room, e);
        }
        fatal.into()
    }
}

/// Picks the player whose prediction is closest to `final_price`.
///
/// Players without a prediction are skipped. On an exact tie the player who
/// joined first wins.
pub fn resolve_winner(players: &[Player], final_price: Price) -> Winner {
    let Some(final_price_dec) = Decimal::from_f64(final_price) else {
        return Winner::NoWinner;
    };
    let mut best: Option<(&Player, Price, Decimal)> = None;
    for player in players {
        let Some(prediction) = player.prediction else {
            continue;
        };
        let Some(prediction_dec) = Decimal::from_f64(prediction) else {
            continue;
        };
        let distance = (prediction_dec - final_price_dec).abs();
        match best {
            Some((_, _, best_distance)) if best_distance <= distance => {}
            _ => best = Some((player, prediction, distance)),
        }
    }
    match best {
        Some((player, prediction, distance)) => Winner::Player {
            name: player.name.clone(),
            prediction,
            distance,
        },
        None => Winner::NoWinner,
    }
}

/// Parses a prediction as typed by a player.
pub fn parse_prediction(input: &str) -> Result<Price, RaceError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(RaceError::validation("prediction is empty"));
    }
    let value = input
        .parse::<Price>()
        .map_err(|_| RaceError::validation(format!("prediction {:?} is not a number", input)))?;
    if !is_valid_price(value) {
        return Err(RaceError::validation(format!(
            "prediction {} is not a valid price",
            input
        )));
    }
    Ok(value)
}

/// Records a player's prediction while the room is still accepting them.
pub async fn submit_prediction(
    db: &(dyn DB + Send + Sync),
    room: &RoomCode,
    player: &PlayerName,
    input: &str,
) -> Result<Price> {
    let prediction = parse_prediction(input)?;
    if db.set_prediction(room, player, prediction).await? {
        debug!("{} predicts ${} in room {}", player, prediction, room);
        return Ok(prediction);
    }
    let room_data = db
        .get_room(room)
        .await?
        .ok_or(RaceError::RoomNotFound(room.clone()))?;
    if room_data.started {
        return Err(RaceError::RaceAlreadyStarted(room.clone()).into());
    }
    Err(RaceError::validation(format!("{} is not in room {}", player, room)).into())
}
