use actix_web::web::ServiceConfig;

pub mod api;
pub mod health;

/// Register every route of the server
pub fn routes(cfg: &mut ServiceConfig) {
    health::routes(cfg);
    api::routes(cfg);
}
