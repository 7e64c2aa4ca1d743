use actix_cors::Cors;
use actix_web::{
    get,
    http::header,
    middleware::Logger,
    options, post,
    web::{self, Data},
    App, HttpResponse, HttpServer,
};
use common::req::{AuthResponse, Credentials, MessageResponse, SensorReading};
use serde_json::{Map, Value};

use crate::{
    auth,
    config::Config,
    db::{Db, NewSensorReading, StorageError, TimeRange},
    error::ApiError,
    utils::secs_since_epoch,
};

const REQUIRED_FIELDS: [&str; 3] = ["temperature", "humidity", "timestamp"];

// A value that does not fit its column is stored as NULL rather than failing
// the whole reading. The device's own `timestamp` is required but never stored.
struct ReadingFields<'a>(&'a Map<String, Value>);

impl ReadingFields<'_> {
    fn real(&self, name: &str) -> Option<f64> {
        match self.0.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    /// Whole floats are coerced, anything outside `i32` is dropped.
    fn integer(&self, name: &str) -> Option<i32> {
        match self.0.get(name)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i32::try_from(i).ok(),
                None => {
                    let f = n.as_f64()?;
                    let fits = f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64;
                    fits.then_some(f as i32)
                }
            },
            Value::Bool(b) => Some(i32::from(*b)),
            _ => None,
        }
    }

    fn stamped(&self, timestamp: i64) -> NewSensorReading {
        NewSensorReading {
            temperature: self.real("temperature"),
            humidity: self.real("humidity"),
            bpm: self.real("bpm"),
            ir: self.integer("ir"),
            acc_x: self.real("accX"),
            acc_y: self.real("accY"),
            acc_z: self.real("accZ"),
            flame_digital: self.integer("flameDigital"),
            flame_analog: self.integer("flameAnalog"),
            gas_digital: self.integer("gasDigital"),
            gas_analog: self.integer("gasAnalog"),
            spo2: self.real("spo2"),
            timestamp,
        }
    }
}

fn parse_reading(body: &Value, timestamp: i64) -> Result<NewSensorReading, ApiError> {
    let fields = match body.as_object() {
        Some(fields) if !fields.is_empty() => fields,
        _ => return Err(ApiError::Validation("No valid JSON data provided")),
    };

    if !REQUIRED_FIELDS.iter().all(|name| fields.contains_key(*name)) {
        log::warn!("Missing fields, received data: {body}");
        return Err(ApiError::Validation("Missing required fields"));
    }

    Ok(ReadingFields(fields).stamped(timestamp))
}

#[post("/api/post-data")]
async fn api_post_data(
    body: web::Json<Value>,
    db: web::Data<Db>,
) -> Result<HttpResponse, ApiError> {
    let reading = parse_reading(&body, secs_since_epoch())?;

    if let Err(e) = db.insert_reading(&reading) {
        log::error!("Failed to save data: {e}, received data: {}", *body);
        return Err(ApiError::SaveFailed);
    }

    Ok(HttpResponse::Created().json(MessageResponse {
        message: "Data received successfully".to_string(),
    }))
}

// Decoded from raw pairs so repeated keys or junk values fall back to the
// latest-readings query instead of rejecting the request.
#[derive(Debug, Default)]
struct GetDataQuery {
    start_time: Option<String>,
    end_time: Option<String>,
}

impl GetDataQuery {
    /// First occurrence of each key wins.
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "start_time" if query.start_time.is_none() => query.start_time = Some(value),
                "end_time" if query.end_time.is_none() => query.end_time = Some(value),
                _ => {}
            }
        }
        query
    }

    fn range(&self) -> Option<TimeRange> {
        let start = self.start_time.as_deref()?.trim().parse().ok()?;
        let end = self.end_time.as_deref()?.trim().parse().ok()?;
        Some(TimeRange { start, end })
    }
}

#[get("/api/get-data")]
async fn api_get_data(
    pairs: web::Query<Vec<(String, String)>>,
    db: web::Data<Db>,
) -> Result<web::Json<Vec<SensorReading>>, ApiError> {
    let query = GetDataQuery::from_pairs(pairs.into_inner());
    let range = query.range();
    log::debug!("get-data {query:?} -> {range:?}");

    match db.query_readings(range) {
        Ok(rows) => Ok(web::Json(rows.into_iter().map(SensorReading::from).collect())),
        Err(e) => {
            log::error!("Failed to read data: {e}");
            Err(ApiError::Internal)
        }
    }
}

#[options("/api/get-data")]
async fn api_get_data_options() -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse {
        message: "OK".to_string(),
    })
}

/// Both fields present and non-empty.
fn required_credentials(creds: Credentials) -> Option<(String, String)> {
    let username = creds.username.filter(|u| !u.is_empty())?;
    let password = creds.password.filter(|p| !p.is_empty())?;
    Some((username, password))
}

#[post("/api/register")]
async fn api_register(
    creds: web::Json<Credentials>,
    db: web::Data<Db>,
) -> Result<HttpResponse, ApiError> {
    let (username, password) = required_credentials(creds.into_inner())
        .ok_or(ApiError::Validation("Missing username or password"))?;

    let password_hash = auth::hash_password(&password).map_err(|e| {
        log::error!("Failed to hash password for '{username}': {e}");
        ApiError::Internal
    })?;

    match db.insert_user(&username, &password_hash) {
        Ok(()) => {
            log::info!("Registered user '{username}'");
            Ok(HttpResponse::Ok().json(AuthResponse {
                message: "User registered successfully".to_string(),
                username,
            }))
        }
        Err(StorageError::Duplicate) => {
            log::info!("Registration rejected, '{username}' already exists");
            Err(ApiError::UsernameTaken)
        }
        Err(e) => {
            log::error!("Failed to register '{username}': {e}");
            Err(ApiError::Registration(e.to_string()))
        }
    }
}

#[post("/api/login")]
async fn api_login(
    creds: web::Json<Credentials>,
    db: web::Data<Db>,
) -> Result<HttpResponse, ApiError> {
    let Some((username, password)) = required_credentials(creds.into_inner()) else {
        return Err(ApiError::InvalidCredentials);
    };

    let stored = db.user_password_hash(&username).map_err(|e| {
        log::error!("Failed to look up '{username}': {e}");
        ApiError::Internal
    })?;

    match stored {
        Some(hash) if auth::verify_password(&password, &hash) => {
            Ok(HttpResponse::Ok().json(AuthResponse {
                message: "Login successful".to_string(),
                username,
            }))
        }
        Some(_) => {
            log::warn!("Login failed for '{username}': wrong password");
            Err(ApiError::InvalidCredentials)
        }
        None => {
            log::warn!("Login failed for '{username}': no such user");
            Err(ApiError::InvalidCredentials)
        }
    }
}

async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        log::warn!("Rejected request body: {err}");
        ApiError::Validation("No valid JSON data provided").into()
    })
}

/// Routes, extractor configs and the JSON 404 fallback.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(api_register)
        .service(api_login)
        .service(api_get_data)
        .service(api_get_data_options)
        .service(api_post_data)
        .default_service(web::to(not_found));
}

pub fn cors(allowed_origin: &str) -> Cors {
    Cors::default()
        .allowed_origin(allowed_origin)
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
        .allowed_header(header::CONTENT_TYPE)
        .expose_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
        .supports_credentials()
        .max_age(3600)
}

pub async fn new_http_server(db: Db, config: Config) -> std::io::Result<()> {
    let addr = (config.host.clone(), config.port);
    log::info!("Listening on {}:{}", addr.0, addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(db.clone()))
            .wrap(cors(&config.allowed_origin))
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(addr)?
    .run()
    .await
}
