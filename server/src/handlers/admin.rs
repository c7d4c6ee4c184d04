use crate::admin::{AdminCommand, RoomDescription};
use crate::handlers::ask;
use crate::server::ServerTx;
use actix_web::web;
use actix_web::{Responder, Result};
use askama_actix::Template;

#[derive(Template)]
#[template(path = "admin-rooms.html")]
pub struct AdminRoomsTemplate {
    rooms: Vec<RoomDescription>,
}

pub fn configure_admin_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin").service(web::resource("/").route(web::get().to(admin_rooms))),
    );
}

pub async fn admin_rooms(srv_tx: web::Data<ServerTx>) -> Result<impl Responder> {
    let rooms = ask(srv_tx.get_ref(), |tx| AdminCommand::ListRooms { tx }).await?;
    Ok(AdminRoomsTemplate { rooms })
}
