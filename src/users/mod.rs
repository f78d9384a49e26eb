pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod validation;

pub use repo_types::{Employee, NewUser, Role, UserChanges, UserRecord, WirelessProvider};
