//! Extension seams toward the host application.
//!
//! [`Navigator`] is how the session core tells the UI that the user must sign in again, and
//! [`RequestSignerExt`] is how an access token ends up on an outgoing request. Both are plain
//! traits so hosts can route them into whatever router or HTTP client they already use.

pub mod navigator;
pub mod request_signer;

pub use navigator::*;
pub use request_signer::*;
