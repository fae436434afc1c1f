use serde::{Deserialize, Serialize};

use lib_sensor::LatestData;

pub const DEFAULT_LIMIT: i64 = 1000;

/// `GET /data` with at least one stored reading.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse {
    pub status: String,
    pub latest_data: LatestData,
    pub last_updated: String,
    pub total_records: i64,
}

/// `GET /data` on an empty table.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmptyResponse {
    pub message: String,
    pub data: Vec<LatestData>,
}

/// `GET /data/all`. `total_records` counts the returned rows.
#[derive(Debug, Serialize, Deserialize)]
pub struct AllDataResponse {
    pub status: String,
    pub data: Vec<LatestData>,
    pub total_records: usize,
    pub last_updated: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}
