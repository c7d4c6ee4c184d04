use crate::admin::AdminCommand;
use crate::handlers::ask;
use crate::server::ServerTx;
use actix_web::{web, HttpResponse};
use actix_web::{error, Responder, Result};
use serde::Deserialize;
use serde_json::json;
use system::{RoomId, SystemError};

pub fn configure_room_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(
            web::resource("/rooms")
                .route(web::post().to(create_room))
                .route(web::get().to(list_rooms)),
        )
        .service(web::resource("/rooms/{room_id}").route(web::delete().to(close_room)));
}

#[derive(Deserialize)]
pub struct CreateRoomBody {
    name: String,
    code: Option<String>,
}

fn error_response(system_error: SystemError) -> HttpResponse {
    let body = json!({ "ok": false, "reason": system_error });
    match system_error {
        SystemError::RoomNotFound => HttpResponse::NotFound().json(body),
        SystemError::RoomCodeTaken(_) | SystemError::RoomNotEmpty => {
            HttpResponse::Conflict().json(body)
        }
        _ => HttpResponse::BadRequest().json(body),
    }
}

async fn health(srv_tx: web::Data<ServerTx>) -> Result<impl Responder> {
    let report = ask(srv_tx.get_ref(), |tx| AdminCommand::Health { tx }).await?;
    Ok(HttpResponse::Ok().json(report))
}

async fn list_rooms(srv_tx: web::Data<ServerTx>) -> Result<impl Responder> {
    let rooms = ask(srv_tx.get_ref(), |tx| AdminCommand::ListRooms { tx }).await?;
    Ok(HttpResponse::Ok().json(rooms))
}

async fn create_room(
    srv_tx: web::Data<ServerTx>,
    body: web::Json<CreateRoomBody>,
) -> Result<impl Responder> {
    let CreateRoomBody { name, code } = body.into_inner();
    let result = ask(srv_tx.get_ref(), |tx| AdminCommand::CreateRoom { name, code, tx }).await?;
    Ok(match result {
        Ok(summary) => HttpResponse::Created().json(json!({ "ok": true, "room": summary })),
        Err(system_error) => error_response(system_error),
    })
}

async fn close_room(
    srv_tx: web::Data<ServerTx>,
    path: web::Path<String>,
) -> Result<impl Responder> {
    let room_id = path
        .parse::<RoomId>()
        .map_err(|_| error::ErrorBadRequest("invalid format"))?;
    let result = ask(srv_tx.get_ref(), |tx| AdminCommand::CloseRoom { room_id, tx }).await?;
    Ok(match result {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(system_error) => error_response(system_error),
    })
}
