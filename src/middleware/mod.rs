//! axum middleware that logs every HTTP exchange and every reported
//! handler error through a [`Logger`].
//!
//! ```ignore
//! let http = HttpLogging::new(logger.clone());
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .layer(middleware::from_fn_with_state(http.clone(), error_logging))
//!     .layer(middleware::from_fn_with_state(http, response_logger));
//! ```

mod body;
mod clock;
mod error;
mod request;
mod response;

pub use body::CompletionBody;
pub use clock::{Clock, SystemClock};
pub use error::{error_logger, error_logging, resolve_status, ApiError, ReportableError, ReportedError};
pub use request::RequestSummary;
pub use response::response_logger;

use crate::logger::Logger;
use std::sync::Arc;

/// Request bodies up to this size are captured in the response record.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// State shared by the logging middleware.
#[derive(Clone)]
pub struct HttpLogging {
    logger: Logger,
    clock: Arc<dyn Clock>,
    max_body_bytes: usize,
}

impl HttpLogging {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            clock: Arc::new(SystemClock),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Largest declared `Content-Length` whose body is logged. `0`
    /// disables body capture.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}
