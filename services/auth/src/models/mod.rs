//! Authentication service models

pub mod job;
pub mod session;
pub mod signup;
pub mod user;

// Re-export for convenience
pub use job::{Job, JobStatus, NewJob};
pub use session::{LoginLinkRecord, MainSessionRecord, NonceRecord, SignupSessionRecord};
pub use signup::{MagicLink, NewMagicLink, NewPendingSignup, PendingSignup, SignupStatus};
pub use user::{NewUser, User};
