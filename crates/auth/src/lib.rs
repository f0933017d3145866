//! Role-based authorization for yard operations.
//!
//! Roles arrive as an opaque parameter alongside every core operation; this
//! crate maps them to permissions and provides the pure `authorize` check
//! enforced at the application boundary. No identity/token mechanics live
//! here.

pub mod authorize;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use permissions::Permission;
pub use roles::Role;
