use crate::api::*;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{query, Executor, Row, SqlitePool};
use std::str::FromStr;

pub const DB_MEMORY: &str = "sqlite::memory:";
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Room records keyed by room code. Every write is a whole-document
/// read-modify-write of a single room, guarded by its version column.
/// Writes answer `false` when the room is missing or the change is not
/// allowed in the room's current state.
#[async_trait]
pub trait DB {
    async fn create_room(&self, room: Room, host_token: HostToken) -> Result<bool>;
    async fn join_room(&self, code: &RoomCode, player: &PlayerName) -> Result<bool>;
    async fn get_room(&self, code: &RoomCode) -> Result<Option<Room>>;
    async fn get_host_token(&self, code: &RoomCode) -> Result<Option<HostToken>>;
    async fn set_prediction(
        &self,
        code: &RoomCode,
        player: &PlayerName,
        prediction: Price,
    ) -> Result<bool>;
    async fn start_race(
        &self,
        code: &RoomCode,
        start_time: DateTime<Utc>,
        initial_samples: Vec<PriceSample>,
    ) -> Result<bool>;
    async fn append_samples(&self, code: &RoomCode, samples: Vec<PriceSample>) -> Result<bool>;
    async fn set_winner(&self, code: &RoomCode, outcome: RaceOutcome) -> Result<bool>;
    async fn abort_race(&self, code: &RoomCode, reason: String) -> Result<bool>;
}
pub struct SQLite {
    connection: SqlitePool,
}
impl SQLite {
    pub async fn new(db_conn: Option<String>) -> Result<Self> {
        let url = db_conn.unwrap_or(DB_MEMORY.to_string());
        let options = SqliteConnectOptions::from_str(&url)
            .with_context(|| format!("invalid database url {}", url))?
            .create_if_missing(true);
        // Every connection to an in-memory database is a database of its own.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let connection = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .with_context(|| format!("couldn't open database {}", url))?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS rooms (\
                code PRIMARY KEY,\
                host_token NOT NULL,\
                document NOT NULL,\
                version NOT NULL DEFAULT 0\
                )",
            )
            .await?;
        Ok(Self { connection })
    }
    async fn update_room<F>(&self, code: &RoomCode, mut mutate: F) -> Result<bool>
    where
        F: FnMut(&mut Room) -> bool + Send,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(mut room) = self.get_room(code).await? else {
                return Ok(false);
            };
            if !mutate(&mut room) {
                return Ok(false);
            }
            let version = room.version;
            room.version += 1;
            let document = serde_json::to_string(&room)?;
            let updated = self
                .connection
                .execute(
                    query(
                        "UPDATE rooms \
                        SET document = ?, version = ? \
                        WHERE code = ? AND version = ?",
                    )
                    .bind(document)
                    .bind(room.version)
                    .bind(code)
                    .bind(version),
                )
                .await
                .with_context(|| format!("couldn't write room {}", code))?
                .rows_affected();
            if updated == 1 {
                return Ok(true);
            }
            debug!(
                "Room {} changed underneath version {}, retrying write",
                code, version
            );
        }
        bail!(
            "couldn't write room {} after {} attempts",
            code,
            MAX_WRITE_ATTEMPTS
        )
    }
}
#[async_trait]
impl DB for SQLite {
    async fn create_room(&self, room: Room, host_token: HostToken) -> Result<bool> {
        let inserted = self
            .connection
            .execute(
                query(
                    "INSERT OR IGNORE INTO rooms (\
                    code,\
                    host_token,\
                    document,\
                    version)\
                    VALUES (?,?,?,?)",
                )
                .bind(room.code.clone())
                .bind(host_token)
                .bind(serde_json::to_string(&room)?)
                .bind(room.version),
            )
            .await
            .with_context(|| format!("couldn't create room {}", room.code))?
            .rows_affected();
        Ok(inserted == 1)
    }
    async fn join_room(&self, code: &RoomCode, player: &PlayerName) -> Result<bool> {
        self.update_room(code, |room| {
            if room.started || room.player(player).is_some() {
                return false;
            }
            room.players.push(Player {
                name: player.clone(),
                prediction: None,
            });
            true
        })
        .await
    }
    async fn get_room(&self, code: &RoomCode) -> Result<Option<Room>> {
        let row = self
            .connection
            .fetch_optional(query("SELECT document, version FROM rooms WHERE code = ?").bind(code))
            .await
            .with_context(|| format!("couldn't read room {}", code))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let document: String = row.get("document");
        let mut room: Room = serde_json::from_str(&document)
            .with_context(|| format!("corrupt document for room {}", code))?;
        room.version = row.get("version");
        Ok(Some(room))
    }
    async fn get_host_token(&self, code: &RoomCode) -> Result<Option<HostToken>> {
        let row = self
            .connection
            .fetch_optional(query("SELECT host_token FROM rooms WHERE code = ?").bind(code))
            .await?;
        Ok(row.map(|row| row.get("host_token")))
    }
    async fn set_prediction(
        &self,
        code: &RoomCode,
        player: &PlayerName,
        prediction: Price,
    ) -> Result<bool> {
        self.update_room(code, |room| {
            if room.started {
                return false;
            }
            match room.player_mut(player) {
                Some(player) => {
                    player.prediction = Some(prediction);
                    true
                }
                None => false,
            }
        })
        .await
    }
    async fn start_race(
        &self,
        code: &RoomCode,
        start_time: DateTime<Utc>,
        initial_samples: Vec<PriceSample>,
    ) -> Result<bool> {
        self.update_room(code, |room| {
            if room.started {
                return false;
            }
            room.started = true;
            room.start_time = Some(start_time);
            room.samples = initial_samples.clone();
            true
        })
        .await
    }
    async fn append_samples(&self, code: &RoomCode, samples: Vec<PriceSample>) -> Result<bool> {
        self.update_room(code, |room| {
            if room.race_state() != RaceState::Running {
                return false;
            }
            if let (Some(last), Some(first)) = (room.samples.last(), samples.first()) {
                if first.time < last.time {
                    return false;
                }
            }
            room.samples.extend(samples.iter().cloned());
            true
        })
        .await
    }
    async fn set_winner(&self, code: &RoomCode, outcome: RaceOutcome) -> Result<bool> {
        self.update_room(code, |room| {
            if room.race_state() != RaceState::Running {
                return false;
            }
            room.outcome = Some(outcome.clone());
            true
        })
        .await
    }
    async fn abort_race(&self, code: &RoomCode, reason: String) -> Result<bool> {
        self.update_room(code, |room| {
            if room.race_state() != RaceState::Running {
                return false;
            }
            room.aborted = Some(reason.clone());
            true
        })
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bitcoin() -> CryptoAsset {
        CryptoAsset {
            id: "bitcoin".into(),
            name: "Bitcoin".into(),
            symbol: "btc".into(),
            image: None,
        }
    }
    fn sample(time: Elapsed, price: Price) -> PriceSample {
        PriceSample {
            time,
            price,
            timestamp: Utc::now(),
        }
    }
    async fn db_with_room(code: &str) -> SQLite {
        let db = SQLite::new(None).await.unwrap();
        let room = Room::new(code.into(), "alice".into(), bitcoin(), 60);
        assert!(db.create_room(room, "token".into()).await.unwrap());
        db
    }

    #[tokio::test]
    async fn create_and_read_room() {
        let db = db_with_room("ABC123").await;
        let room = db.get_room(&"ABC123".into()).await.unwrap().unwrap();
        assert_eq!(room.host, "alice");
        assert_eq!(room.asset, bitcoin());
        assert_eq!(room.version, 0);
        assert_eq!(
            db.get_host_token(&"ABC123".into()).await.unwrap(),
            Some("token".to_string())
        );
        assert_eq!(db.get_room(&"NOPE00".into()).await.unwrap(), None);
        assert_eq!(db.get_host_token(&"NOPE00".into()).await.unwrap(), None);

        let clash = Room::new("ABC123".into(), "mallory".into(), bitcoin(), 60);
        assert!(!db.create_room(clash, "other".into()).await.unwrap());
    }

    #[tokio::test]
    async fn prediction_round_trip_and_version_bump() {
        let db = db_with_room("ABC123").await;
        let code = "ABC123".to_string();
        assert!(db.join_room(&code, &"bob".into()).await.unwrap());
        assert!(db.set_prediction(&code, &"bob".into(), 105.25).await.unwrap());
        let room = db.get_room(&code).await.unwrap().unwrap();
        assert_eq!(room.player("bob").unwrap().prediction, Some(105.25));
        assert_eq!(room.version, 2);

        assert!(db.set_prediction(&code, &"bob".into(), 99.0).await.unwrap());
        let room = db.get_room(&code).await.unwrap().unwrap();
        assert_eq!(room.player("bob").unwrap().prediction, Some(99.0));

        assert!(!db.set_prediction(&code, &"carol".into(), 1.0).await.unwrap());
        assert!(!db
            .set_prediction(&"NOPE00".into(), &"bob".into(), 1.0)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn join_rejects_duplicates_and_started_rooms() {
        let db = db_with_room("ABC123").await;
        let code = "ABC123".to_string();
        assert!(!db.join_room(&code, &"alice".into()).await.unwrap());
        assert!(db.join_room(&code, &"bob".into()).await.unwrap());
        assert!(db
            .start_race(&code, Utc::now(), vec![sample(0, 100.0)])
            .await
            .unwrap());
        assert!(!db.join_room(&code, &"carol".into()).await.unwrap());
        assert!(!db.join_room(&"NOPE00".into(), &"carol".into()).await.unwrap());
    }

    #[tokio::test]
    async fn started_room_locks_predictions() {
        let db = db_with_room("ABC123").await;
        let code = "ABC123".to_string();
        assert!(db.set_prediction(&code, &"alice".into(), 100.0).await.unwrap());
        assert!(db
            .start_race(&code, Utc::now(), vec![sample(0, 100.0)])
            .await
            .unwrap());
        assert!(!db.set_prediction(&code, &"alice".into(), 200.0).await.unwrap());
        assert!(!db.start_race(&code, Utc::now(), vec![]).await.unwrap());
        let room = db.get_room(&code).await.unwrap().unwrap();
        assert_eq!(room.player("alice").unwrap().prediction, Some(100.0));
        assert_eq!(room.race_state(), RaceState::Running);
    }

    #[tokio::test]
    async fn samples_append_in_order_and_winner_is_final() {
        let db = db_with_room("ABC123").await;
        let code = "ABC123".to_string();
        assert!(!db.append_samples(&code, vec![sample(1, 1.0)]).await.unwrap());
        assert!(db
            .start_race(&code, Utc::now(), vec![sample(0, 100.0)])
            .await
            .unwrap());
        assert!(db.append_samples(&code, vec![sample(1, 101.0)]).await.unwrap());
        assert!(db.append_samples(&code, vec![sample(2, 99.0)]).await.unwrap());
        assert!(!db.append_samples(&code, vec![sample(1, 50.0)]).await.unwrap());
        let room = db.get_room(&code).await.unwrap().unwrap();
        let prices: Vec<Price> = room.samples.iter().map(|s| s.price).collect();
        assert_eq!(prices, vec![100.0, 101.0, 99.0]);

        let outcome = RaceOutcome {
            winner: Winner::NoWinner,
            final_price: 99.0,
            end_time: Utc::now(),
        };
        assert!(db.set_winner(&code, outcome.clone()).await.unwrap());
        let other = RaceOutcome {
            final_price: 1.0,
            ..outcome.clone()
        };
        assert!(!db.set_winner(&code, other).await.unwrap());
        assert!(!db.abort_race(&code, "late".into()).await.unwrap());
        let room = db.get_room(&code).await.unwrap().unwrap();
        assert_eq!(room.outcome, Some(outcome));
        assert_eq!(room.race_state(), RaceState::Ended);
    }

    #[tokio::test]
    async fn abort_only_while_running() {
        let db = db_with_room("ABC123").await;
        let code = "ABC123".to_string();
        assert!(!db.abort_race(&code, "quotes down".into()).await.unwrap());
        assert!(db
            .start_race(&code, Utc::now(), vec![sample(0, 100.0)])
            .await
            .unwrap());
        assert!(db.abort_race(&code, "quotes down".into()).await.unwrap());
        let room = db.get_room(&code).await.unwrap().unwrap();
        assert_eq!(room.race_state(), RaceState::Aborted);
        assert_eq!(room.aborted.as_deref(), Some("quotes down"));
    }
}
