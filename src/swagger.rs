use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::tournament::create_tournament,
        handlers::tournament::get_tournament,
        handlers::tournament::get_all_tournaments,
        handlers::tournament::get_open_tournaments,
        handlers::tournament::get_tournaments_by_organizer,
        handlers::tournament::update_tournament_status,
        handlers::tournament::increment_participants,
        handlers::tournament::decrement_participants,
        handlers::ticket::create_ticket,
        handlers::ticket::get_ticket,
        handlers::ticket::get_ticket_by_qr,
        handlers::ticket::get_ticket_by_unique_code,
        handlers::ticket::get_tickets_by_user,
        handlers::ticket::get_tickets_by_tournament,
        handlers::ticket::validate_ticket,
        handlers::ticket::cancel_ticket,
        handlers::ticket::get_qr_image,
    ),
    components(
        schemas(
            User,
            UserRole,
            UserResponse,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            AuthResponse,
            TournamentStatus,
            Tournament,
            CreateTournamentRequest,
            UpdateStatusRequest,
            TournamentResponse,
            TicketStatus,
            Ticket,
            CreateTicketRequest,
            ValidateTicketRequest,
            ValidateTicketResponse,
            QrImageResponse,
            TicketResponse,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication API"),
        (name = "tournament", description = "Tournament management API"),
        (name = "ticket", description = "Ticket issuance and validation API"),
    ),
    info(
        title = "Tournament Backend API",
        version = "1.0.0",
        description = "Tournament registration and ticket issuance REST API documentation",
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
