mod auth;

pub use auth::OwnerId;
