pub mod config;
pub mod error;
pub mod module;
pub mod query;
pub mod types;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use module::Module;
pub use query::{CmpOp, Condition, FilterValue, ListQuery, QuerySchema, SortKey};
pub use types::{merge_patch, new_id, now_rfc3339, parse_timestamp, valid_id, ListResult};
