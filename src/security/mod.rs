pub mod blocklist;
pub mod client_ip;
mod filter;
mod rate_limit;
mod sanitizer;

pub use blocklist::BlockList;
pub use filter::{SanitizingFilter, SecurityHeaders, MAX_BODY_BYTES};
pub use rate_limit::{RateLimit, RateLimiter, HEADER_LIMIT, HEADER_REMAINING};
pub use sanitizer::HtmlSanitizer;
