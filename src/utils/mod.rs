/// User supplied path handling
pub mod path;
/// Retry with exponential backoff
pub mod retry;

pub use path::{normalize_user_input_path, resolve_against};
pub use retry::{with_retry, RetryPolicy};
