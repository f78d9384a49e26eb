pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod providers;
pub mod state;
pub mod storage;
pub mod users;

pub use error::{UserError, ValidationErrors};
pub use state::AppState;
