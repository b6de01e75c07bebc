use crate::api::*;
use crate::error::RaceError;
use crate::race::{self, RaceLifecycle, Tick};
use crate::{db::DB, quote_source::QuoteSource};
use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const ROOM_CODE_LENGTH: usize = 6;
const HOST_TOKEN_LENGTH: usize = 30;
const MAX_ROOM_CODE_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct RaceSettings {
    pub duration_sec: u32,
    pub tick_interval: Duration,
    pub max_quote_failures: u32,
}
impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            duration_sec: race::DEFAULT_RACE_DURATION_SEC,
            tick_interval: Duration::from_secs(1),
            max_quote_failures: race::DEFAULT_MAX_QUOTE_FAILURES,
        }
    }
}

pub struct CryptoRace {
    db: Arc<Box<dyn DB + Send + Sync>>,
    quotes: Arc<Box<dyn QuoteSource + Send + Sync>>,
    settings: RaceSettings,
    drivers: Mutex<HashMap<RoomCode, JoinHandle<()>>>,
}

impl CryptoRace {
    pub fn new(
        db: Box<dyn DB + Send + Sync>,
        quotes: Box<dyn QuoteSource + Send + Sync>,
        settings: RaceSettings,
    ) -> Self {
        Self {
            db: Arc::new(db),
            quotes: Arc::new(quotes),
            settings,
            drivers: Mutex::new(HashMap::new()),
        }
    }
    pub async fn create_room(
        &self,
        player: PlayerName,
        asset: CryptoAsset,
    ) -> Result<(RoomCode, HostToken)> {
        let player = validate_name(&player)?;
        if asset.symbol.trim().is_empty() {
            bail!(RaceError::validation("a cryptocurrency has to be selected"));
        }
        let host_token = random_string(HOST_TOKEN_LENGTH);
        for _ in 0..MAX_ROOM_CODE_ATTEMPTS {
            let code = random_string(ROOM_CODE_LENGTH).to_uppercase();
            let room = Room::new(
                code.clone(),
                player.clone(),
                asset.clone(),
                self.settings.duration_sec,
            );
            if self.db.create_room(room, host_token.clone()).await? {
                info!("{} created room {} racing {}", player, code, asset);
                return Ok((code, host_token));
            }
            debug!("Room code {} is taken, trying another", code);
        }
        bail!(
            "couldn't find a free room code after {} attempts",
            MAX_ROOM_CODE_ATTEMPTS
        )
    }
    pub async fn join_room(&self, room: &RoomCode, player: &PlayerName) -> Result<RoomCode> {
        let room = normalize_code(room);
        let player = validate_name(player)?;
        if self.db.join_room(&room, &player).await? {
            info!("{} joined room {}", player, room);
            return Ok(room);
        }
        let existing = self.get_room(&room).await?;
        if existing.started {
            bail!(RaceError::RaceAlreadyStarted(room));
        }
        bail!(RaceError::validation(format!(
            "{} is already taken in room {}",
            player, room
        )))
    }
    pub async fn get_room(&self, room: &RoomCode) -> Result<Room> {
        let room = normalize_code(room);
        self.db
            .get_room(&room)
            .await?
            .ok_or(RaceError::RoomNotFound(room).into())
    }
    pub async fn submit_prediction(
        &self,
        room: &RoomCode,
        player: &PlayerName,
        prediction: &str,
    ) -> Result<Price> {
        let room = normalize_code(room);
        let player = validate_name(player)?;
        race::submit_prediction(&**self.db, &room, &player, prediction).await
    }
    /// Starts the race and hands it to a background driver that ticks it
    /// until it ends or aborts.
    pub async fn start_race(&self, room: &RoomCode, host_token: &HostToken) -> Result<()> {
        let room = normalize_code(room);
        let token = self
            .db
            .get_host_token(&room)
            .await?
            .ok_or(RaceError::RoomNotFound(room.clone()))?;
        if &token != host_token {
            bail!(RaceError::NotHost(room));
        }
        let room_data = self.get_room(&room).await?;
        let mut race = RaceLifecycle::new(&room_data, self.settings.max_quote_failures);
        race.start(&**self.quotes, &**self.db)
            .await
            .with_context(|| format!("couldn't start race in room {}", room))?;
        let handle = tokio::spawn(drive_race(
            race,
            self.db.clone(),
            self.quotes.clone(),
            self.settings.tick_interval,
        ));
        let mut drivers = self.drivers.lock().await;
        drivers.retain(|_, driver| !driver.is_finished());
        if let Some(previous) = drivers.insert(room, handle) {
            previous.abort();
        }
        Ok(())
    }
    pub async fn get_assets(&self) -> Result<Vec<CryptoAsset>> {
        self.quotes
            .list_assets()
            .await
            .context("couldn't fetch cryptocurrency list")
    }
    pub async fn get_price(&self, symbol: &str) -> Result<Price> {
        self.quotes
            .fetch_price(symbol)
            .await
            .map_err(|e| {
                anyhow::Error::from(RaceError::QuoteFetch {
                    symbol: symbol.to_string(),
                    reason: format!("{:#}", e),
                })
            })
    }
    pub async fn shutdown(&self) {
        for (room, handle) in self.drivers.lock().await.drain() {
            if !handle.is_finished() {
                debug!("Stopping race driver for room {}", room);
                handle.abort();
            }
        }
    }
}

async fn drive_race(
    mut race: RaceLifecycle,
    db: Arc<Box<dyn DB + Send + Sync>>,
    quotes: Arc<Box<dyn QuoteSource + Send + Sync>>,
    tick_interval: Duration,
) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately and the start sample is already taken
    interval.tick().await;
    loop {
        interval.tick().await;
        match race.tick(&**quotes, &**db).await {
            Ok(Tick::Sampled(_)) => {}
            Ok(Tick::Finished(outcome)) => {
                debug!("Race driver for room {} done: {:?}", race.room(), outcome);
                break;
            }
            Ok(Tick::Inactive) => break,
            Err(e) => match e.downcast_ref::<RaceError>() {
                Some(race_error) if race_error.is_transient() => {
                    warn!("Room {}: skipped tick: {}", race.room(), race_error)
                }
                Some(RaceError::TooManyQuoteFailures { .. }) => {
                    error!("Room {}: race stopped: {}", race.room(), e);
                    break;
                }
                _ => {
                    error!("Room {}: race stopped: {:#}", race.room(), e);
                    let reason = format!("race stopped: {:#}", e);
                    match db.abort_race(race.room(), reason).await {
                        Ok(true) => {}
                        Ok(false) => warn!("Room {} was no longer running", race.room()),
                        Err(e) => error!("Couldn't abort room {}: {:#}", race.room(), e),
                    }
                    break;
                }
            },
        }
    }
}

fn validate_name(name: &str) -> Result<PlayerName, RaceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RaceError::validation("player name is empty"));
    }
    Ok(name.to_string())
}
fn normalize_code(code: &str) -> RoomCode {
    code.trim().to_uppercase()
}
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
