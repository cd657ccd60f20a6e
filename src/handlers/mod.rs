pub mod auth;
pub mod ticket;
pub mod tournament;

pub use auth::auth_config;
pub use ticket::ticket_config;
pub use tournament::tournament_config;
