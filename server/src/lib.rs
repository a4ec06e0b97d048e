pub extern crate actix_web;

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod handlers;
pub mod liveness;
pub mod server;
pub mod session;
