//! The `transport` module is responsible for handling network communication
//! with clients over HTTP.
//!
//! It defines the request and response bodies of the API, maps broker and
//! store errors to HTTP responses, and implements the server itself: the
//! Server-Sent Events subscribe endpoint and the endpoints that publish
//! into it.

pub mod error;
pub mod http;
pub mod message;

pub use error::AppError;
pub use http::{AppState, CONNECTION_ID_HEADER, router, start_http_server};
