mod gateway;

pub use gateway::{create_router, validate_request};
