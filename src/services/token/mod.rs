pub mod claims;
pub mod parser;

pub use claims::{Claims, MAX_TOKEN_LIFETIME_SECS};
pub use parser::{TokenError, age, is_expired, is_token_expired, is_valid_format, parse, token_age};
