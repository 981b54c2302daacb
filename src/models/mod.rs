pub mod capability;
pub mod dataset;
pub mod ingest_mode;
pub mod schema;
pub mod versioning;

pub use capability::*;
pub use dataset::*;
pub use ingest_mode::*;
pub use schema::*;
pub use versioning::*;
