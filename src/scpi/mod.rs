//! SCPI interpreter building blocks.
//!
//! [`pattern`] matches headers against command patterns, [`params`] parses
//! parameter lists, and this module holds the pieces shared by both sides
//! of the conversation: the standard error codes, the bounded error queue
//! behind `SYSTem:ERRor?` and the response builder that formats query
//! results onto the output line.

pub mod params;
pub mod pattern;

use core::fmt::Write as _;

use static_assertions::const_assert;

/// Capacity of the error queue.
pub const ERROR_QUEUE_SIZE: usize = 17;

/// Largest response line the instrument emits. A full 256-entry pulse
/// sequence query dominates the sizing.
pub const MAX_RESPONSE_SIZE: usize = 4096;

const_assert!(MAX_RESPONSE_SIZE >= crate::pulse::MAX_PULSES * 14);

/// Fixed-capacity response line.
pub type ResponseBuffer = arrayvec::ArrayString<MAX_RESPONSE_SIZE>;

/// Standard SCPI error conditions the instrument raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScpiError {
    SyntaxError,
    MissingParameter,
    UndefinedHeader,
    InvalidSuffix,
    ExecutionError,
    DataOutOfRange,
    IllegalParameterValue,
    QueueOverflow,
}

impl ScpiError {
    pub fn code(self) -> i16 {
        match self {
            Self::SyntaxError => -102,
            Self::MissingParameter => -109,
            Self::UndefinedHeader => -113,
            Self::InvalidSuffix => -131,
            Self::ExecutionError => -200,
            Self::DataOutOfRange => -222,
            Self::IllegalParameterValue => -224,
            Self::QueueOverflow => -350,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::SyntaxError => "Syntax error",
            Self::MissingParameter => "Missing parameter",
            Self::UndefinedHeader => "Undefined header",
            Self::InvalidSuffix => "Invalid suffix",
            Self::ExecutionError => "Execution error",
            Self::DataOutOfRange => "Data out of range",
            Self::IllegalParameterValue => "Illegal parameter value",
            Self::QueueOverflow => "Queue overflow",
        }
    }
}

/// Bounded FIFO of pending errors.
///
/// When full, the newest entry is replaced by [`ScpiError::QueueOverflow`]
/// so the reader learns errors were lost; older entries are never dropped.
#[derive(Debug, Default)]
pub struct ErrorQueue {
    entries: heapless::Deque<ScpiError, ERROR_QUEUE_SIZE>,
}

impl ErrorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ScpiError) {
        if self.entries.push_back(error).is_err() {
            self.entries.pop_back();
            // Capacity is at least one, this cannot fail.
            let _ = self.entries.push_back(ScpiError::QueueOverflow);
        }
    }

    pub fn pop(&mut self) -> Option<ScpiError> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Accumulates comma-separated query results for one command.
#[derive(Debug, Default)]
pub struct Response {
    buf: ResponseBuffer,
    count: usize,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    fn separator(&mut self) -> Result<(), ScpiError> {
        if self.count > 0 {
            self.buf.try_push(',').map_err(|_| ScpiError::ExecutionError)?;
        }
        self.count += 1;
        Ok(())
    }

    pub fn put_int(&mut self, value: i64) -> Result<(), ScpiError> {
        self.separator()?;
        write!(self.buf, "{value}").map_err(|_| ScpiError::ExecutionError)
    }

    /// Shortest reasonable double format: plain for mid magnitudes,
    /// exponent notation outside them.
    pub fn put_f64(&mut self, value: f64) -> Result<(), ScpiError> {
        self.separator()?;
        let magnitude = value.abs();
        let result = if value == 0.0 {
            self.buf.try_push('0').map_err(|_| core::fmt::Error)
        } else if (1e-3..1e9).contains(&magnitude) {
            write!(self.buf, "{value}")
        } else {
            write!(self.buf, "{value:e}")
        };
        result.map_err(|_| ScpiError::ExecutionError)
    }

    pub fn put_str(&mut self, value: &str) -> Result<(), ScpiError> {
        self.separator()?;
        self.buf
            .try_push_str(value)
            .map_err(|_| ScpiError::ExecutionError)
    }

    /// `SYSTem:ERRor?` payload: `<code>,"<message>"`.
    pub fn put_error(&mut self, error: Option<ScpiError>) -> Result<(), ScpiError> {
        self.separator()?;
        let (code, message) = match error {
            Some(e) => (e.code(), e.message()),
            None => (0, "No error"),
        };
        write!(self.buf, "{code},\"{message}\"").map_err(|_| ScpiError::ExecutionError)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}
