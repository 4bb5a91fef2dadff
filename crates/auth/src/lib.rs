//! `invoicer-auth`: identity and the tenant authorization policy.
//!
//! This crate is intentionally decoupled from HTTP and storage: callers pass an
//! explicit [`Actor`] into every decision, there is no ambient "current user".

pub mod actor;
pub mod password;
pub mod policy;
pub mod roles;
pub mod token;
pub mod user;

pub use actor::Actor;
pub use password::{Argon2PasswordHasher, PasswordHasher, validate_password};
pub use policy::{
    AccessRequest, Action, AuthorizationExplanation, AuthzError, DenialKind, ResourceKind, Scope,
    authorize, authorize_issuer, explain, require_admin_tenant,
};
pub use roles::Role;
pub use token::generate_token;
pub use user::{NewUser, User, UserPatch, UserRecord};
