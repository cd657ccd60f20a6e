use crate::error::AppError;
use crate::middlewares::AuthenticatedUser;
use crate::models::*;
use crate::services::TournamentService;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

fn get_authenticated_user(req: &HttpRequest) -> Option<AuthenticatedUser> {
    req.extensions().get::<AuthenticatedUser>().cloned()
}

fn require_admin(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    match get_authenticated_user(req) {
        Some(user) if user.role.is_admin() => Ok(user),
        Some(_) => Err(AppError::PermissionDenied),
        None => Err(AppError::AuthError("Missing access token".to_string())),
    }
}

#[utoipa::path(
    post,
    path = "/tournaments",
    tag = "tournament",
    request_body = CreateTournamentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "锦标赛创建成功", body = TournamentResponse),
        (status = 400, description = "请求参数错误"),
        (status = 403, description = "无权限")
    )
)]
pub async fn create_tournament(
    tournament_service: web::Data<TournamentService>,
    req: HttpRequest,
    request: web::Json<CreateTournamentRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match tournament_service.create_tournament(request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tournaments/{id}",
    tag = "tournament",
    params(("id" = i64, Path, description = "锦标赛ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取锦标赛成功", body = TournamentResponse),
        (status = 404, description = "锦标赛不存在")
    )
)]
pub async fn get_tournament(
    tournament_service: web::Data<TournamentService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match tournament_service.get_tournament_by_id(path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tournaments",
    tag = "tournament",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "获取锦标赛列表成功"))
)]
pub async fn get_all_tournaments(
    tournament_service: web::Data<TournamentService>,
) -> Result<HttpResponse> {
    match tournament_service.get_all_tournaments().await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tournaments/open",
    tag = "tournament",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "获取开放报名锦标赛成功"))
)]
pub async fn get_open_tournaments(
    tournament_service: web::Data<TournamentService>,
) -> Result<HttpResponse> {
    match tournament_service.get_open_tournaments().await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tournaments/organizer/{organizer_id}",
    tag = "tournament",
    params(("organizer_id" = i64, Path, description = "组织者ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "获取组织者锦标赛成功"))
)]
pub async fn get_tournaments_by_organizer(
    tournament_service: web::Data<TournamentService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match tournament_service
        .get_tournaments_by_organizer(path.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/tournaments/{id}/status",
    tag = "tournament",
    params(("id" = i64, Path, description = "锦标赛ID")),
    request_body = UpdateStatusRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "状态更新成功", body = TournamentResponse),
        (status = 403, description = "无权限"),
        (status = 404, description = "锦标赛不存在")
    )
)]
pub async fn update_tournament_status(
    tournament_service: web::Data<TournamentService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match tournament_service
        .update_tournament_status(path.into_inner(), request.status)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tournaments/{id}/participants/increment",
    tag = "tournament",
    params(("id" = i64, Path, description = "锦标赛ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "参与者计数已增加"),
        (status = 409, description = "锦标赛已满员")
    )
)]
pub async fn increment_participants(
    tournament_service: web::Data<TournamentService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match tournament_service.increment_participants(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({ "success": true }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tournaments/{id}/participants/decrement",
    tag = "tournament",
    params(("id" = i64, Path, description = "锦标赛ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "参与者计数已减少"))
)]
pub async fn decrement_participants(
    tournament_service: web::Data<TournamentService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match tournament_service.decrement_participants(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({ "success": true }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn tournament_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tournaments")
            // 具体路径先于 /{id} 注册
            .route("/open", web::get().to(get_open_tournaments))
            .route(
                "/organizer/{organizer_id}",
                web::get().to(get_tournaments_by_organizer),
            )
            .route("", web::post().to(create_tournament))
            .route("", web::get().to(get_all_tournaments))
            .route("/{id}", web::get().to(get_tournament))
            .route("/{id}/status", web::put().to(update_tournament_status))
            .route(
                "/{id}/participants/increment",
                web::post().to(increment_participants),
            )
            .route(
                "/{id}/participants/decrement",
                web::post().to(decrement_participants),
            ),
    );
}
