//! Business logic for identity and onboarding.
//!
//! Each service owns a `PgPool` clone and runs its multi-step writes in a
//! single transaction. Email never goes out from a request path: services
//! enqueue outbox rows and the [`OutboxDispatcher`] delivers them.

pub mod email;
pub mod error;
pub mod invite;
pub mod jwt;
pub mod metrics;
pub mod outbox;
pub mod registration;
pub mod session;
pub mod slug;
pub mod templates;
pub mod token_hash;
pub mod verification;

pub use email::{EmailError, EmailMessage, EmailSender, MockEmailSender, SmtpEmailSender};
pub use error::ServiceError;
pub use invite::{Actor, InviteService};
pub use jwt::{AccessTokenClaims, JwtService, TokenSubject};
pub use outbox::{DispatcherSettings, OutboxDispatcher};
pub use registration::{RegistrationInput, RegistrationOutcome, RegistrationService};
pub use session::{IssuedSession, SessionManager};
pub use token_hash::TokenHasher;
pub use verification::VerificationService;
