use actix_web::web;

pub mod conversations;
pub mod tasks;
pub mod wsroute;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(wsroute::ws_handler)
        .service(conversations::list_conversations)
        .service(conversations::create_conversation)
        .service(conversations::conversation_with_admin)
        .service(conversations::get_messages)
        .service(conversations::send_message)
        .service(tasks::update_task)
        .route("/health", web::get().to(|| async { "OK" }));
}
