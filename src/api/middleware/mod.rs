pub mod errors;
pub mod logging;

pub use errors::{handle_api_errors, handle_panic};
pub use logging::{logging_middleware, REQUEST_ID_HEADER};
