//! Session domain: tokens, profiles, credentials, and the owning [`SessionStore`].

pub mod model;
pub mod secret;
pub mod store;

pub use model::*;
pub use secret::*;
pub use store::*;
