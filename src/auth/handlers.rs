use actix_web::{web, HttpResponse};
use serde::Deserialize;
use crate::AppState;
use crate::error::AppError;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Deserialize)]
pub struct SignOutRequest {
    pub user: String,
    pub token: String,
}

/// Liveness check.
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().json("Pung")
}

pub async fn sign_up(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received sign-up request");
    state.sessions.sign_up(&req.user, &req.pass).await?;
    Ok(HttpResponse::Ok().json("OK"))
}

pub async fn authenticate(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received authentication request");
    match state.sessions.authenticate(&req.user, &req.pass).await {
        Ok(token) => Ok(HttpResponse::Ok().json(token)),
        Err(e) => {
            warn!("Authentication rejected: {}", e);
            Err(e)
        }
    }
}

pub async fn sign_out(
    req: web::Json<SignOutRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received sign-out request");
    state.sessions.sign_out(&req.user, &req.token).await?;
    Ok(HttpResponse::Ok().json("OK"))
}

/// Mounts the session routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(ping))
        .route("/signup", web::post().to(sign_up))
        .route("/auth", web::post().to(authenticate))
        .route("/signout", web::post().to(sign_out));
}
