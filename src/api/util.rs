use log::debug;
use reqwest::StatusCode;

use crate::error::RaceError;

pub fn map_any_err_and_code(e: anyhow::Error) -> (StatusCode, String) {
    debug!("Error: {:#}", e);
    let code = match e.downcast_ref::<RaceError>() {
        Some(RaceError::RoomNotFound(_)) => StatusCode::NOT_FOUND,
        Some(RaceError::Validation(_)) => StatusCode::BAD_REQUEST,
        Some(RaceError::RaceAlreadyStarted(_)) | Some(RaceError::InvalidState { .. }) => {
            StatusCode::CONFLICT
        }
        Some(RaceError::NotHost(_)) => StatusCode::FORBIDDEN,
        Some(RaceError::QuoteFetch { .. }) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, format!("{:#}", e))
}
