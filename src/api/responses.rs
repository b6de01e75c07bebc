use serde::{Deserialize, Serialize};

use super::*;

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct CreateRoomResponse {
    pub room: RoomCode,
    pub host_token: HostToken,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct PriceResponse {
    pub symbol: String,
    pub price: Price,
}
