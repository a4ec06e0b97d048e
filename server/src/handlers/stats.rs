use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::server::Server;

pub fn configure_stats_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/stats").route(web::get().to(stats)))
        .service(web::resource("/grid").route(web::get().to(grid)));
}

async fn health(server: web::Data<Server>) -> impl Responder {
    let dimensions = server.dimensions();
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "connectedUsers": server.live_count(),
        "grid": {
            "rows": dimensions.rows,
            "cols": dimensions.cols,
            "cells": dimensions.cell_count(),
        },
    }))
}

async fn stats(server: web::Data<Server>) -> impl Responder {
    HttpResponse::Ok().json(server.stats())
}

async fn grid(server: web::Data<Server>) -> impl Responder {
    let dimensions = server.dimensions();
    HttpResponse::Ok().json(json!({
        "rows": dimensions.rows,
        "cols": dimensions.cols,
        "cells": server.grid_snapshot(),
    }))
}
