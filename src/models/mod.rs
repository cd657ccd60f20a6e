pub mod common;
pub mod ticket;
pub mod tournament;
pub mod user;

pub use common::*;
pub use ticket::*;
pub use tournament::*;
pub use user::*;
