//! Chat platform collaborators: the REST client the engine posts and pages
//! through, and the websocket session that feeds it events.

pub mod error;
pub mod payload;
pub mod rest;
pub mod session;

pub use error::GatewayError;
pub use rest::RestClient;
pub use session::GatewaySession;
