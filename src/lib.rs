pub mod cli;
pub mod forwarder;
pub mod net;
pub mod protocol;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
