pub mod cache;
pub mod environment;
pub mod error;
pub mod executor;
pub mod handler;
pub mod interceptor;
pub mod key_generator;
pub mod lazy;
pub mod param;
pub mod reflector;
pub mod registry;
pub mod session;
pub mod session_factory;
pub mod sql;
pub mod udbc;
pub mod value;

pub use session::Cursor;

#[doc(hidden)]
pub use ctor;
pub use sqlweave_macros::mapper;
pub use sqlweave_macros::mapper_assets;
pub use sqlweave_macros::transaction;
pub use sqlweave_macros::TableRow;

pub type Result<T> = std::result::Result<T, error::SqlweaveError>;
