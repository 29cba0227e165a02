//! Result of one sampling call.

use std::fmt;
use std::time::Duration;

use crate::metadata::MetadataRecord;

/// Sampler data attached when responses are not read.
pub const READ_RESPONSE_DISABLED: &str = "Read response is false.";

/// Outcome classification of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Timeout,
    Shutdown,
    Cancelled,
    Interrupted,
    IoError,
    InitError,
    UnknownError,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Timeout => "TIMEOUT",
            StatusCode::Shutdown => "SHUTDOWN",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Interrupted => "INTERRUPTED",
            StatusCode::IoError => "IO_ERROR",
            StatusCode::InitError => "INIT_ERROR",
            StatusCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Numeric response code reported to load-test result listeners.
    pub fn response_code(&self) -> &'static str {
        match self {
            StatusCode::Ok | StatusCode::Interrupted => "200",
            StatusCode::Timeout | StatusCode::InitError => "500",
            StatusCode::Shutdown => "400",
            StatusCode::Cancelled => "300",
            StatusCode::IoError | StatusCode::UnknownError => "100",
        }
    }

    /// Whether this status leaves the session without a subscription.
    pub fn invalidates_subscription(&self) -> bool {
        matches!(
            self,
            StatusCode::Shutdown
                | StatusCode::Cancelled
                | StatusCode::Interrupted
                | StatusCode::IoError
                | StatusCode::UnknownError
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one call to `sample` produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    /// Label of the session that produced the sample.
    pub label: String,
    pub success: bool,
    pub status: StatusCode,
    /// Response message: the last body read, or the failure description.
    pub message: String,
    /// Wall-clock duration of the call.
    pub elapsed: Duration,
    /// Deliveries pulled during the call.
    pub received: usize,
    /// Explicit acknowledgements sent during the call.
    pub acknowledged: usize,
    /// Deliveries the broker flagged as redelivered.
    pub redelivered: usize,
    /// Last body read, when reading responses.
    pub payload: Option<String>,
    /// Metadata of the last delivery read, when reading responses.
    pub metadata: Option<MetadataRecord>,
    /// Serialised metadata, or [`READ_RESPONSE_DISABLED`].
    pub sampler_data: Option<String>,
}

impl SampleOutcome {
    pub(crate) fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            success: false,
            status: StatusCode::UnknownError,
            message: String::new(),
            elapsed: Duration::ZERO,
            received: 0,
            acknowledged: 0,
            redelivered: 0,
            payload: None,
            metadata: None,
            sampler_data: None,
        }
    }

    pub(crate) fn succeed(&mut self) {
        self.success = true;
        self.status = StatusCode::Ok;
        if self.message.is_empty() {
            self.message = "OK".to_string();
        }
    }

    pub(crate) fn fail(&mut self, status: StatusCode, message: impl Into<String>) {
        self.success = false;
        self.status = status;
        self.message = message.into();
    }

    pub fn response_code(&self) -> &'static str {
        self.status.response_code()
    }
}
