// web-server/src/api/mod.rs
pub mod auth;
pub mod users;

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(
        actix_web::web::scope("/api")
            .service(auth::nonce)
            .service(auth::sign_in)
            .service(auth::session)
            .service(auth::sign_out)
            .service(users::me)
            .service(users::admin_status)
    );
}
