pub mod handler;
pub mod router;
pub mod schema;
pub mod types;

pub use handler::MessageHandler;
pub use router::{route, ParseError};
pub use types::InboundMessage;
