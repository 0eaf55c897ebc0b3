//! Rate limiting logic and state management.

pub mod clock;
mod limiter;
mod policy;
mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::RateLimiter;
pub use policy::{PolicyResolver, PolicyTier};
pub use record::{RateLimitRecord, WINDOW};
