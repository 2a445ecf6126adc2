mod attempts;
mod jwt;
mod login_guard;
mod middleware;
mod password;
mod types;

pub use attempts::AttemptTracker;
pub use jwt::TokenService;
pub use login_guard::LoginGuard;
pub use middleware::TokenAuth;
pub use password::PasswordHasher;
pub use types::{AuthUser, Claims};
