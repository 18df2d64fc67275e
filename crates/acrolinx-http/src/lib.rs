//! HTTP plumbing shared by every Acrolinx client component
//!
//! - `transport`: request execution and the single error classification path
//! - `error`: `AcrolinxError`, the only error type callers ever see
//! - `headers`: client identification and auth headers
//! - `poll`: classification of asynchronous `progress` / `data` responses
//! - `clock`: suspension points for polling loops, replaceable in tests

pub mod clock;
pub mod error;
pub mod headers;
pub mod poll;
pub mod transport;

pub use clock::{Clock, ManualClock, TokioClock};
pub use common::{EndpointConfig, ServiceType};
pub use error::{AcrolinxError, ErrorType, HttpRequest, Result, ValidationDetail};
pub use poll::{ApiResponse, PollOutcome, Progress};
pub use transport::{HttpTransport, RequestOptions};
