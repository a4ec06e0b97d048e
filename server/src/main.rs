use std::io;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use tokio::sync::watch;

use server::config::ServerConfig;
use server::handlers::root;
use server::liveness::spawn_liveness_monitor;
use server::server::Server;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    config
        .validate()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    let server = web::Data::new(Server::new(config.dimensions()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor =
        spawn_liveness_monitor(server.clone().into_inner(), config.liveness(), shutdown_rx);

    log::info!(
        "Server started on {}:{} with a {}x{} grid",
        config.host,
        config.port,
        config.rows,
        config.cols
    );

    let app_server = server.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(app_server.clone())
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .configure(root)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = monitor.await {
        log::warn!("liveness monitor ended abnormally: {}", err);
    }
    log::info!("Server stopped ({} sessions at shutdown)", server.live_count());

    Ok(())
}
