// keep in sync with the column list in backend/src/schema.rs

/// One stored telemetry record as returned by `GET /api/get-data`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SensorReading {
    pub temperature: Option<f64>, // °C
    pub humidity: Option<f64>,    // percent
    pub bpm: Option<f64>,
    pub ir: Option<i32>,
    #[serde(rename = "accX")]
    pub acc_x: Option<f64>,
    #[serde(rename = "accY")]
    pub acc_y: Option<f64>,
    #[serde(rename = "accZ")]
    pub acc_z: Option<f64>,
    #[serde(rename = "flameDigital")]
    pub flame_digital: Option<i32>,
    #[serde(rename = "flameAnalog")]
    pub flame_analog: Option<i32>,
    #[serde(rename = "gasDigital")]
    pub gas_digital: Option<i32>,
    #[serde(rename = "gasAnalog")]
    pub gas_analog: Option<i32>,
    pub spo2: Option<f64>,        // percent
    pub timestamp: i64,           // s since epoch, assigned by the server
    pub created_at: Option<String>, // "YYYY-MM-DD HH:MM:SS", UTC
}

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
