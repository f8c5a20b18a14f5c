mod handlers;
mod headers;
mod processor;

pub use handlers::*;
pub use headers::{get_client_ip, get_referrer, get_user_agent};
pub use processor::*;
