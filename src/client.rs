use anyhow::{bail, Result};
use reqwest::{Response, StatusCode};
use serde::Serialize;

use crate::api::*;

#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    client: reqwest::Client,
}
impl Client {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::new();
        Self { url, client }
    }
    async fn post(
        &self,
        path: &'static str,
        request: impl Serialize,
        expexted_code: StatusCode,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.url.clone() + path)
            .json(&request)
            .send()
            .await?;
        bail_if_err(response, expexted_code).await
    }
    async fn get(&self, path: &'static str, expexted_code: StatusCode) -> Result<Response> {
        let response = self.client.get(self.url.clone() + path).send().await?;
        bail_if_err(response, expexted_code).await
    }
    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<CreateRoomResponse> {
        let response = self
            .post("/create_room", request, StatusCode::CREATED)
            .await?;
        Ok(response.json::<CreateRoomResponse>().await?)
    }
    pub async fn join_room(&self, request: JoinRoomRequest) -> Result<RoomCode> {
        let response = self.post("/join_room", request, StatusCode::OK).await?;
        Ok(response.json::<RoomCode>().await?)
    }
    pub async fn get_room(&self, room: RoomCode) -> Result<Room> {
        let response = self
            .post("/get_room", RoomRequest { room }, StatusCode::OK)
            .await?;
        Ok(response.json::<Room>().await?)
    }
    pub async fn submit_prediction(&self, request: SubmitPredictionRequest) -> Result<Price> {
        let response = self
            .post("/submit_prediction", request, StatusCode::OK)
            .await?;
        Ok(response.json::<Price>().await?)
    }
    pub async fn start_race(&self, request: StartRaceRequest) -> Result<()> {
        self.post("/start_race", request, StatusCode::OK).await?;
        Ok(())
    }
    pub async fn get_assets(&self) -> Result<Vec<CryptoAsset>> {
        let response = self.get("/get_assets", StatusCode::OK).await?;
        Ok(response.json::<Vec<CryptoAsset>>().await?)
    }
    pub async fn get_price(&self, symbol: String) -> Result<PriceResponse> {
        let response = self
            .post("/get_price", PriceRequest { symbol }, StatusCode::OK)
            .await?;
        Ok(response.json::<PriceResponse>().await?)
    }
}

pub async fn bail_if_err(response: Response, expexted_code: StatusCode) -> Result<Response> {
    if response.status() != expexted_code {
        bail!("{}: {}", response.status(), response.text().await?)
    } else {
        Ok(response)
    }
}
