use crate::connection::ws_index;
use crate::handlers::admin::configure_admin_handlers;
use crate::handlers::rooms::configure_room_handlers;
use crate::server::ServerTx;
use actix_cors::Cors;
use actix_web::{error, web};
use tokio::sync::oneshot;

mod admin;
mod rooms;

pub fn root(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws/").route(web::get().to(ws_index)));

    configure_room_handlers(cfg);
    configure_admin_handlers(cfg);
}

pub fn cors(allowed_origins: &[String]) -> Cors {
    allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
}

/// Sends a request to the server actor and waits for its answer.
async fn ask<T, F>(srv_tx: &ServerTx, make: F) -> Result<T, error::Error>
where
    F: FnOnce(oneshot::Sender<T>) -> crate::admin::AdminCommand,
{
    let (tx, rx) = oneshot::channel::<T>();

    srv_tx
        .send(make(tx).into())
        .await
        .map_err(|_| error::ErrorInternalServerError("Internal Server Error"))?;

    rx.await
        .map_err(|_| error::ErrorInternalServerError("Receiver await error"))
}
