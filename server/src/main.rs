use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use std::io;

use server::config::Config;
use server::handlers::{cors, root};
use server::server::spawn_server;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    let authenticator = config
        .authenticator()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let srv_tx = spawn_server(config.server_config(), authenticator, config.snapshot_store());
    let settings = config.connection_settings();
    let allowed_origins = config.allowed_origins.clone();

    log::info!("Listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&allowed_origins))
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(srv_tx.clone()))
            .app_data(web::Data::new(settings.clone()))
            .configure(root)
    })
    .bind(&config.bind)?
    .run()
    .await
}
