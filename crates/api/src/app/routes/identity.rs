use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    response::Response,
};
use serde_json::json;

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::BackOffice;

use super::{created, ok};

pub async fn register(
    Extension(services): Extension<Arc<BackOffice>>,
    Json(body): Json<dto::RegisterRequest>,
) -> ApiResult<Response> {
    let user = services.register(&body.email, &body.password, body.tenant_id).await?;
    Ok(created(json!({
        "message": "Registration successful. Please check your email to verify your account.",
        "user": user,
    })))
}

pub async fn verify_email(
    Extension(services): Extension<Arc<BackOffice>>,
    Query(query): Query<dto::TokenQuery>,
) -> ApiResult<Response> {
    let (user, changed) = services.verify_email(&query.token).await?;
    let message = if changed {
        "Email verified successfully. You can now log in."
    } else {
        "Email is already verified."
    };
    Ok(ok(json!({ "message": message, "user": user })))
}

pub async fn login(
    Extension(services): Extension<Arc<BackOffice>>,
    Json(body): Json<dto::LoginRequest>,
) -> ApiResult<Response> {
    Ok(ok(services.login(&body.email, &body.password, body.remember_me).await?))
}

pub async fn resume(
    Extension(services): Extension<Arc<BackOffice>>,
    Json(body): Json<dto::ResumeRequest>,
) -> ApiResult<Response> {
    Ok(ok(services.resume(&body.remember_me_token).await?))
}

pub async fn accept_invitation(
    Extension(services): Extension<Arc<BackOffice>>,
    Json(body): Json<dto::AcceptInvitationRequest>,
) -> ApiResult<Response> {
    let user = services.accept_invitation(&body.token, &body.password).await?;
    Ok(ok(json!({
        "message": "Invitation accepted. You can now log in.",
        "user": user,
    })))
}
