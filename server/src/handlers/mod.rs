use crate::connection::ws_index;
use crate::handlers::stats::configure_stats_handlers;
use actix_web::web;

mod stats;

pub fn root(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(ws_index)))
        .service(web::resource("/ws/").route(web::get().to(ws_index)));

    configure_stats_handlers(cfg);
}
