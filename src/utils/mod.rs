pub mod code_generator;
pub mod jwt;
pub mod password;

pub use code_generator::{generate_unique_qr_code, generate_unique_ticket_code};
pub use jwt::*;
pub use password::*;
