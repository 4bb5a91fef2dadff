use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::Response,
    routing::{get, post},
};

use invoicer_core::UserId;

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::services::BackOffice;
use crate::context::AuthContext;

use super::{created, items, no_content, ok};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/invite", post(invite_user))
        .route("/:id", get(get_user).patch(update_user).delete(delete_user))
}

pub async fn list_users(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<dto::UsersQuery>,
) -> ApiResult<Response> {
    Ok(items(services.list_users(auth.actor(), query.tenant_id).await?))
}

pub async fn get_user(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<UserId>,
) -> ApiResult<Response> {
    Ok(ok(services.get_user(auth.actor(), id).await?))
}

pub async fn create_user(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<dto::CreateUserRequest>,
) -> ApiResult<Response> {
    Ok(created(services.create_user(auth.actor(), body.into()).await?))
}

pub async fn invite_user(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<dto::InviteUserRequest>,
) -> ApiResult<Response> {
    Ok(created(services.invite_user(auth.actor(), &body.email, body.roles).await?))
}

pub async fn update_user(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<UserId>,
    Json(body): Json<dto::UpdateUserRequest>,
) -> ApiResult<Response> {
    Ok(ok(services.update_user(auth.actor(), id, body.into()).await?))
}

pub async fn delete_user(
    Extension(services): Extension<Arc<BackOffice>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<UserId>,
) -> ApiResult<Response> {
    services.delete_user(auth.actor(), id).await?;
    Ok(no_content())
}
