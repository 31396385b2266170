// web-server/src/api/users.rs
// Role-gated routes
use actix::Addr;
use actix_web::{get, web, HttpRequest, HttpResponse};
use common::models::session::{WalletSession, ROLE_ADMIN, ROLE_USER};
use common::Config;
use serde_json::json;

use crate::api::auth::current_session;
use crate::error::ApiError;
use crate::session_registry::{GetSessionMetrics, SessionRegistryActor};

/// Session of the caller if it holds at least one of `roles`.
///
/// No session is `Unauthorized`; a session without any of the roles is
/// `Forbidden`.
pub async fn require_roles(
    req: &HttpRequest,
    registry: &Addr<SessionRegistryActor>,
    config: &Config,
    roles: &[&str],
) -> Result<WalletSession, ApiError> {
    if roles.is_empty() {
        return Err(ApiError::internal("require_roles called without roles"));
    }
    let session = current_session(req, registry, config)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if roles.iter().any(|role| session.has_role(role)) {
        Ok(session)
    } else {
        tracing::warn!("{} lacks roles {:?}", session.address, roles);
        Err(ApiError::Forbidden)
    }
}

#[get("/users/me")]
pub async fn me(
    req: HttpRequest,
    registry: web::Data<Addr<SessionRegistryActor>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let session = require_roles(&req, &registry, &config, &[ROLE_USER]).await?;
    Ok(HttpResponse::Ok().json(json!({
        "address": session.address,
        "chainId": session.chain_id,
        "roles": session.roles,
        "isAdmin": session.has_role(ROLE_ADMIN),
    })))
}

#[get("/admin/status")]
pub async fn admin_status(
    req: HttpRequest,
    registry: web::Data<Addr<SessionRegistryActor>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    require_roles(&req, &registry, &config, &[ROLE_ADMIN]).await?;
    let metrics = registry.send(GetSessionMetrics).await.map_err(ApiError::internal)?;
    Ok(HttpResponse::Ok().json(metrics))
}

#[cfg(test)]
mod tests {
    use crate::session_registry::{CreateSession, SessionRegistryActor};
    use actix::Actor;
    use actix_web::cookie::Cookie;
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, init_service, read_body_json, TestRequest};
    use actix_web::{web, App};
    use common::{generate_session_token, Config};
    use serde_json::Value;

    async fn session_cookie(
        registry: &actix::Addr<SessionRegistryActor>,
        config: &Config,
        roles: &[&str],
    ) -> Cookie<'static> {
        let session = registry
            .send(CreateSession {
                address: "0x71c7656ec7ab88b098defb751b7401b5f6d8976f".to_string(),
                chain_id: 44787,
                roles: roles.iter().map(|r| r.to_string()).collect(),
            })
            .await
            .unwrap();
        let token = generate_session_token(
            &session.session_id,
            &session.address,
            &session.roles,
            config.session.ttl_seconds,
            config.session.jwt_secret.as_bytes(),
        )
        .unwrap();
        Cookie::new(config.session.cookie_name.clone(), token)
    }

    #[actix_web::test]
    async fn test_role_gates() {
        let config = Config::default();
        let registry = SessionRegistryActor::new(&config.session).start();
        let user = session_cookie(&registry, &config, &["user"]).await;
        let admin = session_cookie(&registry, &config, &["user", "admin"]).await;
        let app = init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .app_data(web::Data::new(registry))
                .configure(crate::api::configure),
        )
        .await;

        let resp = call_service(&app, TestRequest::get().uri("/api/users/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = call_service(&app, TestRequest::get().uri("/api/users/me").cookie(user.clone()).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["isAdmin"], false);

        let resp = call_service(&app, TestRequest::get().uri("/api/admin/status").cookie(user).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = call_service(&app, TestRequest::get().uri("/api/admin/status").cookie(admin).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["active_sessions"], 2);
        assert_eq!(body["admin_sessions"], 1);

        let forged = Cookie::new(config.session.cookie_name.clone(), "not-a-token");
        let resp = call_service(&app, TestRequest::get().uri("/api/users/me").cookie(forged).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
