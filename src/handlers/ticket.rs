use crate::error::AppError;
use crate::middlewares::AuthenticatedUser;
use crate::models::*;
use crate::services::TicketService;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, ResponseError, Result};
use serde_json::json;

fn get_authenticated_user(req: &HttpRequest) -> Option<AuthenticatedUser> {
    req.extensions().get::<AuthenticatedUser>().cloned()
}

#[utoipa::path(
    post,
    path = "/tickets",
    tag = "ticket",
    request_body = CreateTicketRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "购票成功", body = TicketResponse),
        (status = 404, description = "用户或锦标赛不存在"),
        (status = 409, description = "不可购票 (未开放/满员/重复)")
    )
)]
pub async fn create_ticket(
    ticket_service: web::Data<TicketService>,
    req: HttpRequest,
    request: web::Json<CreateTicketRequest>,
) -> Result<HttpResponse> {
    let Some(caller) = get_authenticated_user(&req) else {
        return Ok(AppError::AuthError("Missing access token".to_string()).error_response());
    };

    // 管理端可代用户购票, 普通用户只能为自己购票
    let user_id = match request.user_id {
        Some(uid) if caller.role.is_admin() => uid,
        _ => caller.id,
    };

    match ticket_service.create_ticket(user_id, request.tournament_id).await {
        Ok(ticket) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": TicketResponse::from(ticket)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tickets/{id}",
    tag = "ticket",
    params(("id" = i64, Path, description = "门票ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取门票成功", body = TicketResponse),
        (status = 404, description = "门票不存在")
    )
)]
pub async fn get_ticket(
    ticket_service: web::Data<TicketService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match ticket_service.get_ticket_by_id(path.into_inner()).await {
        Ok(Some(ticket)) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": TicketResponse::from(ticket)
        }))),
        Ok(None) => Ok(AppError::NotFound("Ticket not found".to_string()).error_response()),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tickets/qr/{qr_code}",
    tag = "ticket",
    params(("qr_code" = String, Path, description = "QR 码")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取门票成功", body = TicketResponse),
        (status = 404, description = "门票不存在")
    )
)]
pub async fn get_ticket_by_qr(
    ticket_service: web::Data<TicketService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match ticket_service.get_ticket_by_qr_code(&path.into_inner()).await {
        Ok(Some(ticket)) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": TicketResponse::from(ticket)
        }))),
        Ok(None) => Ok(AppError::NotFound("Ticket not found".to_string()).error_response()),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tickets/code/{unique_code}",
    tag = "ticket",
    params(("unique_code" = String, Path, description = "门票唯一码")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取门票成功", body = TicketResponse),
        (status = 404, description = "门票不存在")
    )
)]
pub async fn get_ticket_by_unique_code(
    ticket_service: web::Data<TicketService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match ticket_service
        .get_ticket_by_unique_code(&path.into_inner())
        .await
    {
        Ok(Some(ticket)) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": TicketResponse::from(ticket)
        }))),
        Ok(None) => Ok(AppError::NotFound("Ticket not found".to_string()).error_response()),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tickets/user/{user_id}",
    tag = "ticket",
    params(("user_id" = i64, Path, description = "用户ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "获取用户门票成功"))
)]
pub async fn get_tickets_by_user(
    ticket_service: web::Data<TicketService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match ticket_service.get_tickets_by_user(path.into_inner()).await {
        Ok(tickets) => {
            let data: Vec<TicketResponse> = tickets.into_iter().map(Into::into).collect();
            Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tickets/tournament/{tournament_id}",
    tag = "ticket",
    params(("tournament_id" = i64, Path, description = "锦标赛ID")),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "获取锦标赛门票成功"))
)]
pub async fn get_tickets_by_tournament(
    ticket_service: web::Data<TicketService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match ticket_service
        .get_tickets_by_tournament(path.into_inner())
        .await
    {
        Ok(tickets) => {
            let data: Vec<TicketResponse> = tickets.into_iter().map(Into::into).collect();
            Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tickets/validate",
    tag = "ticket",
    request_body = ValidateTicketRequest,
    security(("bearer_auth" = [])),
    responses((status = 200, description = "核销结果", body = ValidateTicketResponse))
)]
pub async fn validate_ticket(
    ticket_service: web::Data<TicketService>,
    request: web::Json<ValidateTicketRequest>,
) -> Result<HttpResponse> {
    match ticket_service.validate_and_use_ticket(&request.qr_code).await {
        Ok(valid) => {
            let message = if valid {
                "Ticket validated successfully"
            } else {
                "Ticket is not valid"
            };
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "data": ValidateTicketResponse {
                    valid,
                    message: message.to_string(),
                }
            })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/tickets/{id}/cancel",
    tag = "ticket",
    params(("id" = i64, Path, description = "门票ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "取消成功"),
        (status = 404, description = "门票不存在"),
        (status = 409, description = "门票已使用")
    )
)]
pub async fn cancel_ticket(
    ticket_service: web::Data<TicketService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let Some(caller) = get_authenticated_user(&req) else {
        return Ok(AppError::AuthError("Missing access token".to_string()).error_response());
    };
    let ticket_id = path.into_inner();

    // 只有持票人或管理端可以取消
    match ticket_service.get_ticket_by_id(ticket_id).await {
        Ok(Some(ticket)) => {
            if ticket.user_id != caller.id && !caller.role.is_admin() {
                return Ok(AppError::PermissionDenied.error_response());
            }
        }
        Ok(None) => {
            return Ok(AppError::NotFound("Ticket not found".to_string()).error_response())
        }
        Err(e) => return Ok(e.error_response()),
    }

    match ticket_service.cancel_ticket(ticket_id).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Ticket cancelled"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/tickets/{id}/qr-image",
    tag = "ticket",
    params(("id" = i64, Path, description = "门票ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "二维码图片", body = QrImageResponse),
        (status = 404, description = "门票不存在")
    )
)]
pub async fn get_qr_image(
    ticket_service: web::Data<TicketService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match ticket_service.get_qr_image(path.into_inner()).await {
        Ok(qr_image) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": QrImageResponse { qr_image }
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn ticket_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tickets")
            // 具体路径先于 /{id} 注册
            .route("/validate", web::post().to(validate_ticket))
            .route("/qr/{qr_code}", web::get().to(get_ticket_by_qr))
            .route("/code/{unique_code}", web::get().to(get_ticket_by_unique_code))
            .route("/user/{user_id}", web::get().to(get_tickets_by_user))
            .route(
                "/tournament/{tournament_id}",
                web::get().to(get_tickets_by_tournament),
            )
            .route("", web::post().to(create_ticket))
            .route("/{id}", web::get().to(get_ticket))
            .route("/{id}/cancel", web::post().to(cancel_ticket))
            .route("/{id}/qr-image", web::get().to(get_qr_image)),
    );
}
