#![allow(unused)]
use std::fmt::Write;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use api::*;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};

use crate::client::Client;

mod api;
mod client;
mod error;

const HOST_TOKEN_FILE: &str = "host_token";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    url: String,
}
#[derive(Subcommand)]
enum Commands {
    CreateRoom {
        #[arg(short, long)]
        player: PlayerName,
        /// Asset id or ticker symbol, e.g. "bitcoin" or "btc"
        #[arg(short, long)]
        asset: String,
    },
    JoinRoom {
        #[arg(short, long)]
        room: RoomCode,
        #[arg(short, long)]
        player: PlayerName,
    },
    Room {
        #[arg(short, long)]
        room: RoomCode,
    },
    Predict {
        #[arg(short, long)]
        room: RoomCode,
        #[arg(short, long)]
        player: PlayerName,
        #[arg(long)]
        prediction: String,
    },
    StartRace {
        #[arg(short, long)]
        room: RoomCode,
        /// Defaults to the token saved by create-room
        #[arg(long)]
        host_token: Option<HostToken>,
    },
    Watch {
        #[arg(short, long)]
        room: RoomCode,
        #[arg(short, long, default_value_t = 5)]
        interval_sec: u64,
    },
    Assets,
    Price {
        #[arg(short, long)]
        symbol: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let client = Client::new(cli.url);

    match cli.command {
        Commands::CreateRoom { player, asset } => {
            let assets = client.get_assets().await?;
            let Some(asset) = assets.into_iter().find(|candidate| {
                candidate.id == asset || candidate.symbol.eq_ignore_ascii_case(&asset)
            }) else {
                bail!("unknown asset {}", asset)
            };
            let response = client
                .create_room(CreateRoomRequest { player, asset })
                .await?;
            let mut file = File::create(HOST_TOKEN_FILE).await?;
            file.write_all(response.host_token.as_bytes()).await?;
            println!("Created room {}", response.room);
            println!("Host token saved to {}", HOST_TOKEN_FILE);
        }
        Commands::JoinRoom { room, player } => {
            let room = client.join_room(JoinRoomRequest { room, player }).await?;
            println!("Joined room {}", room);
        }
        Commands::Room { room } => {
            let room = client.get_room(room).await?;
            print_room(&room)?;
        }
        Commands::Predict {
            room,
            player,
            prediction,
        } => {
            let prediction = client
                .submit_prediction(SubmitPredictionRequest {
                    room,
                    player,
                    prediction,
                })
                .await?;
            println!("Prediction locked in: ${:.2}", prediction);
        }
        Commands::StartRace { room, host_token } => {
            let host_token = match host_token {
                Some(token) => token,
                None => read_host_token().await?,
            };
            client
                .start_race(StartRaceRequest { room, host_token })
                .await?;
            println!("Race started");
        }
        Commands::Watch { room, interval_sec } => loop {
            let state = client.get_room(room.clone()).await?;
            print_room(&state)?;
            match state.race_state() {
                RaceState::Ended | RaceState::Aborted => break,
                _ => tokio::time::sleep(Duration::from_secs(interval_sec.max(1))).await,
            }
        },
        Commands::Assets => {
            for asset in client.get_assets().await? {
                println!("{:<16} {}", asset.id, asset);
            }
        }
        Commands::Price { symbol } => {
            let response = client.get_price(symbol).await?;
            println!("{}: ${:.2}", response.symbol.to_uppercase(), response.price);
        }
    }
    Ok(())
}

fn print_room(room: &Room) -> Result<()> {
    print!("{}", render_room(room, Utc::now())?);
    Ok(())
}
fn render_room(room: &Room, now: DateTime<Utc>) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Room {} | {} | {}", room.code, room.asset, room.race_state())?;
    match room.race_state() {
        RaceState::Idle => {
            writeln!(out, "Race duration: {}s", room.duration_sec)?;
        }
        RaceState::Running => {
            writeln!(out, "Time left: {}s", room.time_left(now))?;
        }
        _ => {}
    }
    if let Some(start) = room.start_time {
        writeln!(out, "Started: {}", start.format(TIME_FORMAT))?;
    }
    if let Some(outcome) = &room.outcome {
        writeln!(out, "Ended: {}", outcome.end_time.format(TIME_FORMAT))?;
    }
    if let (Some(initial), Some(current)) = (room.initial_price(), room.current_price()) {
        writeln!(
            out,
            "Start price: ${:.2} | Current price: ${:.2}",
            initial, current
        )?;
    }
    if !room.samples.is_empty() {
        writeln!(out, "Price history:")?;
        for sample in room.samples.iter() {
            writeln!(out, "  {:>4}s  ${:.2}", sample.time, sample.price)?;
        }
    }
    writeln!(out, "Players:")?;
    for player in room.players.iter() {
        let host = if player.name == room.host { " (host)" } else { "" };
        match (player.prediction, room.current_price()) {
            (Some(prediction), Some(current)) => {
                writeln!(
                    out,
                    "  {}{}: ${:.2} (off by ${:.2})",
                    player.name,
                    host,
                    prediction,
                    (prediction - current).abs()
                )?;
            }
            (Some(prediction), None) => {
                writeln!(out, "  {}{}: ${:.2}", player.name, host, prediction)?;
            }
            (None, _) => {
                writeln!(out, "  {}{}: no prediction", player.name, host)?;
            }
        }
    }
    match (&room.outcome, &room.aborted) {
        (Some(outcome), _) => {
            writeln!(
                out,
                "Final price: ${:.2} | Winner: {}",
                outcome.final_price, outcome.winner
            )?;
        }
        (None, Some(reason)) => {
            writeln!(out, "Race aborted: {}", reason)?;
        }
        (None, None) if room.started => {
            writeln!(out, "Waiting for race to end...")?;
        }
        _ => {}
    }
    Ok(out)
}
async fn read_host_token() -> Result<HostToken> {
    let mut file = File::open(HOST_TOKEN_FILE)
        .await
        .context("no saved host token, pass --host-token")?;
    let mut contents = vec![];
    file.read_to_end(&mut contents).await?;
    Ok(String::from_utf8(contents)?.trim().to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn room() -> Room {
        let asset = CryptoAsset {
            id: "bitcoin".into(),
            name: "Bitcoin".into(),
            symbol: "btc".into(),
            image: None,
        };
        let mut room = Room::new("ABC123".into(), "A".into(), asset, 3);
        room.players[0].prediction = Some(100.0);
        room.players.push(Player {
            name: "B".into(),
            prediction: None,
        });
        room
    }

    #[test]
    fn running_race_shows_history_and_distances() {
        let start: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
        let mut room = room();
        room.started = true;
        room.start_time = Some(start);
        room.samples = [(0, 100.0), (1, 103.5)]
            .into_iter()
            .map(|(time, price)| PriceSample {
                time,
                price,
                timestamp: start + Duration::seconds(time as i64),
            })
            .collect();
        let out = render_room(&room, start + Duration::seconds(1)).unwrap();
        assert!(out.contains("Time left: 2s"));
        assert!(out.contains("Started: 2024-05-01 12:00:00 UTC"));
        assert!(out.contains("     0s  $100.00\n"));
        assert!(out.contains("     1s  $103.50\n"));
        assert!(out.contains("A (host): $100.00 (off by $3.50)"));
        assert!(out.contains("B: no prediction"));
        assert!(out.ends_with("Waiting for race to end...\n"));
    }

    #[test]
    fn ended_race_shows_end_time_and_winner() {
        let start: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
        let mut room = room();
        room.started = true;
        room.start_time = Some(start);
        room.outcome = Some(RaceOutcome {
            winner: Winner::Player {
                name: "A".into(),
                prediction: 100.0,
                distance: Decimal::ONE,
            },
            final_price: 101.0,
            end_time: start + Duration::seconds(3),
        });
        let out = render_room(&room, start + Duration::seconds(10)).unwrap();
        assert!(out.contains("Ended: 2024-05-01 12:00:03 UTC"));
        assert!(out.contains("Final price: $101.00"));
        assert!(!out.contains("Time left"));
        assert!(!out.contains("Waiting"));
    }
}
