pub mod auth_service;
pub mod ticket_service;
pub mod tournament_service;

pub use auth_service::*;
pub use ticket_service::*;
pub use tournament_service::*;
