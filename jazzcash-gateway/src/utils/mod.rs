pub mod error;
pub mod http_client;
pub mod reference;
