#![allow(unused)]
use crate::api::*;
use crate::config::Settings;
use crate::crypto_race::CryptoRace;
use crate::cryptocompare::{CryptoCompareClient, CryptoCompareQuoteSource};
use crate::db::SQLite;
use crate::quote_source::{QuoteSource, TestQuoteSource};
use anyhow::Result;
use axum::extract::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use axum_macros::debug_handler;
use clap::Parser;
use env_logger::{Builder, WriteStyle};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

mod api;
mod client;
mod config;
mod crypto_race;
mod cryptocompare;
mod db;
mod error;
mod quote_source;
mod race;

#[debug_handler]
async fn create_room(
    State(state): State<Arc<RwLock<CryptoRace>>>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), (StatusCode, String)> {
    let backend = state.read().await;
    let (room, host_token) = backend
        .create_room(request.player, request.asset)
        .await
        .map_err(map_any_err_and_code)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse { room, host_token }),
    ))
}
async fn join_room(
    State(state): State<Arc<RwLock<CryptoRace>>>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<Json<RoomCode>, (StatusCode, String)> {
    let backend = state.read().await;
    let room = backend
        .join_room(&request.room, &request.player)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(room))
}
async fn get_room(
    State(state): State<Arc<RwLock<CryptoRace>>>,
    Json(request): Json<RoomRequest>,
) -> Result<Json<Room>, (StatusCode, String)> {
    let backend = state.read().await;
    let room = backend
        .get_room(&request.room)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(room))
}
async fn submit_prediction(
    State(state): State<Arc<RwLock<CryptoRace>>>,
    Json(request): Json<SubmitPredictionRequest>,
) -> Result<Json<Price>, (StatusCode, String)> {
    let backend = state.read().await;
    let prediction = backend
        .submit_prediction(&request.room, &request.player, &request.prediction)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(prediction))
}
#[debug_handler]
async fn start_race(
    State(state): State<Arc<RwLock<CryptoRace>>>,
    Json(request): Json<StartRaceRequest>,
) -> Result<(), (StatusCode, String)> {
    let backend = state.read().await;
    debug!("Starting race in room {}", request.room);
    backend
        .start_race(&request.room, &request.host_token)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(())
}
async fn get_assets(
    State(state): State<Arc<RwLock<CryptoRace>>>,
) -> Result<Json<Vec<CryptoAsset>>, (StatusCode, String)> {
    let backend = state.read().await;
    let assets = backend.get_assets().await.map_err(map_any_err_and_code)?;
    Ok(Json(assets))
}
async fn get_price(
    State(state): State<Arc<RwLock<CryptoRace>>>,
    Json(request): Json<PriceRequest>,
) -> Result<Json<PriceResponse>, (StatusCode, String)> {
    let backend = state.read().await;
    let price = backend
        .get_price(&request.symbol)
        .await
        .map_err(map_any_err_and_code)?;
    Ok(Json(PriceResponse {
        symbol: request.symbol,
        price,
    }))
}

#[derive(Parser)]
struct Args {
    #[arg(short, long)]
    config: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(short, long)]
    test: bool,
    #[arg(short, long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if cli.db.is_some() {
        settings.server.db = cli.db;
    }
    settings.server.test |= cli.test;
    Builder::default()
        .filter_level(settings.log_level())
        .write_style(WriteStyle::Always)
        .parse_default_env()
        .init();
    let (_port, handle) = run_server(settings).await?;
    handle.await?;
    Ok(())
}

async fn run_server(settings: Settings) -> Result<(u16, JoinHandle<()>)> {
    let quotes: Box<dyn QuoteSource + Send + Sync> = if settings.server.test {
        info!("Running with scripted test quotes");
        Box::new(TestQuoteSource::default())
    } else {
        Box::new(CryptoCompareQuoteSource::new(CryptoCompareClient::new(
            settings.quotes.price_url.clone(),
            settings.quotes.assets_url.clone(),
            settings.quote_timeout(),
        )?))
    };
    let state = Arc::new(RwLock::new(CryptoRace::new(
        Box::new(SQLite::new(settings.server.db.clone()).await?),
        quotes,
        settings.race_settings(),
    )));
    let app = Router::new()
        .route("/create_room", post(create_room))
        .route("/join_room", post(join_room))
        .route("/get_room", post(get_room))
        .route("/submit_prediction", post(submit_prediction))
        .route("/start_race", post(start_race))
        .route("/get_assets", get(get_assets))
        .route("/get_price", post(get_price))
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let server = axum::Server::try_bind(&addr)?.serve(app.into_make_service());
    let port = server.local_addr().port();
    debug!("Listening on {}", server.local_addr());
    let handle = tokio::spawn(async move {
        let server = server.with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
            }
        });
        if let Err(e) = server.await {
            error!("Server error: {}", e);
        }
        state.read().await.shutdown().await;
    });
    Ok((port, handle))
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::client::Client;

    use super::*;

    async fn test_server(duration_sec: u32) -> Client {
        let mut settings = Settings::load(None).unwrap();
        settings.server.port = 0;
        settings.server.test = true;
        settings.race.duration_sec = duration_sec;
        settings.race.tick_interval_ms = 10;
        let (port, _) = run_server(settings).await.unwrap();
        Client::new("http://127.0.0.1:".to_string() + port.to_string().as_str())
    }
    fn bitcoin() -> CryptoAsset {
        CryptoAsset {
            id: "bitcoin".into(),
            name: "Bitcoin".into(),
            symbol: "btc".into(),
            image: None,
        }
    }

    #[tokio::test]
    async fn lobby() {
        let client = test_server(60).await;
        let e = client.get_room("NOPE00".into()).await.unwrap_err();
        assert!(e.to_string().starts_with("404"));

        let created = client
            .create_room(CreateRoomRequest {
                player: "alice".into(),
                asset: bitcoin(),
            })
            .await
            .unwrap();
        let joined = client
            .join_room(JoinRoomRequest {
                room: created.room.to_lowercase(),
                player: "bob".into(),
            })
            .await
            .unwrap();
        assert_eq!(joined, created.room);
        let e = client
            .join_room(JoinRoomRequest {
                room: created.room.clone(),
                player: "".into(),
            })
            .await
            .unwrap_err();
        assert!(e.to_string().starts_with("400"));

        let room = client.get_room(created.room.clone()).await.unwrap();
        assert_eq!(room.players.len(), 2);
        assert_eq!(room.race_state(), RaceState::Idle);
        assert_eq!(room.duration_sec, 60);

        let assets = client.get_assets().await.unwrap();
        assert!(assets.iter().any(|asset| asset.symbol == "btc"));
        let price = client.get_price("btc".into()).await.unwrap();
        assert_eq!(price.price, 100.0);
    }

    #[tokio::test]
    async fn race() {
        let client = test_server(3).await;
        let created = client
            .create_room(CreateRoomRequest {
                player: "A".into(),
                asset: bitcoin(),
            })
            .await
            .unwrap();
        let room = created.room.clone();
        client
            .join_room(JoinRoomRequest {
                room: room.clone(),
                player: "B".into(),
            })
            .await
            .unwrap();
        let predicted = client
            .submit_prediction(SubmitPredictionRequest {
                room: room.clone(),
                player: "A".into(),
                prediction: "100".into(),
            })
            .await
            .unwrap();
        assert_eq!(predicted, 100.0);
        let e = client
            .submit_prediction(SubmitPredictionRequest {
                room: room.clone(),
                player: "B".into(),
                prediction: "to the moon".into(),
            })
            .await
            .unwrap_err();
        assert!(e.to_string().starts_with("400"));

        let e = client
            .start_race(StartRaceRequest {
                room: room.clone(),
                host_token: "not the host".into(),
            })
            .await
            .unwrap_err();
        assert!(e.to_string().starts_with("403"));
        client
            .start_race(StartRaceRequest {
                room: room.clone(),
                host_token: created.host_token.clone(),
            })
            .await
            .unwrap();
        let e = client
            .submit_prediction(SubmitPredictionRequest {
                room: room.clone(),
                player: "B".into(),
                prediction: "101".into(),
            })
            .await
            .unwrap_err();
        assert!(e.to_string().starts_with("409"));

        let ended = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = client.get_room(room.clone()).await.unwrap();
                if state.race_state() == RaceState::Ended {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        let outcome = ended.outcome.clone().unwrap();
        assert_eq!(outcome.winner.name(), Some("A"));
        assert_eq!(outcome.final_price, 100.0);
        assert_eq!(ended.samples.len(), 4);
        assert_eq!(ended.player("B").unwrap().prediction, None);
    }
}
