//! Mail transport collaborator.
//!
//! The engine composes completion messages and hands them to a
//! [`MailTransport`]. Delivery mechanics belong to the transport:
//!
//! - [`HttpMailer`]: posts the message as JSON to an HTTP mail relay
//! - [`LogMailer`]: writes the message to the log (dry runs)

mod error;
mod http;
mod logging;
mod traits;

pub use error::MailError;
pub use http::HttpMailer;
pub use logging::LogMailer;
pub use traits::MailTransport;
