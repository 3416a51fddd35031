pub mod audit_event;
pub mod auth_session;
pub mod invitation;
pub mod membership;
pub mod organization;
pub mod outbox;
pub mod user;
pub mod verification_token;

pub use audit_event::{AuditEvent, AuditEventType};
pub use auth_session::{session_is_active, AuthSession, RequestMetadata};
pub use invitation::{invite_is_active, InviteRole, InviteSummary, OrgInvite};
pub use membership::{MemberRole, OrganizationMember, Workspace};
pub use organization::{Organization, OrganizationSettings, OrganizationStatus};
pub use outbox::{
    EmailVerificationRequested, InviteCreated, OutboxEvent, OutboxMessage, OutboxStatus,
};
pub use user::{normalize_email, User, UserResponse};
pub use verification_token::{verification_token_is_usable, EmailVerificationToken};
