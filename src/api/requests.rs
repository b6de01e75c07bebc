use serde::{Deserialize, Serialize};

use super::*;

// Requests
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CreateRoomRequest {
    pub player: PlayerName,
    pub asset: CryptoAsset,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct JoinRoomRequest {
    pub room: RoomCode,
    pub player: PlayerName,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RoomRequest {
    pub room: RoomCode,
}
/// The prediction is kept as entered so the server decides what counts as numeric.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SubmitPredictionRequest {
    pub room: RoomCode,
    pub player: PlayerName,
    pub prediction: String,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StartRaceRequest {
    pub room: RoomCode,
    pub host_token: HostToken,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PriceRequest {
    pub symbol: String,
}
