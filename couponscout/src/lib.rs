pub mod cancel;
pub mod config;
pub mod coupon;
pub mod errors;
pub mod metrics;
pub mod search;

pub use cancel::CancellationToken;
pub use config::{ConfigOverrides, SearchConfig};
pub use coupon::CouponCode;
pub use errors::{FileError, SearchError, SearchResult};
pub use search::{SearchEngine, SearchHandle, SearchTarget, Verdict};
