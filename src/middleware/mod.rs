pub mod auth;
pub mod scopes;

pub use auth::{authenticate, require_principal};
pub use scopes::{check_scopes, ScopeMode, ScopeRequirement};
