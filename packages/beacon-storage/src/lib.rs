pub mod db;
pub mod models;
pub mod qdrant;
pub mod samples;
pub mod schema;
pub mod studies;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
