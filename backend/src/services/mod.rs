pub mod contacts;
pub mod email;

pub use contacts::{ContactDirectory, PgContactDirectory};
pub use email::{EmailService, EmailTransport, OutboundEmail};
