use anyhow::Result;

mod api;
mod auth;
mod config;
mod db;
mod error;
mod logging;
mod schema;
mod utils;

#[actix_web::main]
async fn main() -> Result<()> {
    let config = config::Config::load();
    logging::init(config.log_file.as_deref())?;

    let db = db::Db::connect(&config.database_url, config.pool_size, config.busy_timeout())?;
    log::info!("Using database {}", config.database_url);

    api::new_http_server(db, config).await?;
    Ok(())
}
