//! Magic-link token lifecycle.
//!
//! [`LinkIssuer`] hands out single-use links, [`LinkRedeemer`] exchanges them
//! for a session credential signed by [`SessionSigner`].

pub mod codec;
pub mod error;
pub mod issuer;
pub mod redeemer;
pub mod session;

pub use codec::TokenCodec;
pub use error::{AuthError, AuthResult};
pub use issuer::LinkIssuer;
pub use redeemer::{LinkRedeemer, RedeemedSession};
pub use session::{SessionClaims, SessionCredential, SessionSigner};
