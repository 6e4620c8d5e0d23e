mod user;
mod user_role;
mod verification_token;

pub use user::{User, UserProfile};
pub use user_role::UserRole;
pub use verification_token::VerificationToken;
