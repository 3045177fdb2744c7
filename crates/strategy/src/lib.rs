//! Trading decisions: prediction matching, team tables and order sizing.

pub mod matcher;
pub mod sizing;
pub mod teams;

pub use matcher::Matcher;
pub use sizing::order_count;
pub use teams::TeamTable;
