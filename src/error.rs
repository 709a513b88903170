//! Error types for the export pipeline
//!
//! Failures fall into three groups, mirroring the places they can occur:
//! - Capture errors (the viewport capture primitive refused or failed)
//! - Render errors (canvas allocation, image encode/decode)
//! - Page errors (the scroll surface misbehaved)
//!
//! Capture errors carry the classification the orchestrator's fallback chain
//! keys off: a permission failure is terminal and must surface unchanged,
//! a rate-limit failure is retryable with a longer backoff, and everything
//! else is a transient failure retried on a short delay.
//!
//! All errors use the `thiserror` crate for minimal boilerplate and proper
//! error trait implementations.

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the export pipeline
#[derive(Error, Debug)]
pub enum Error {
  /// Viewport capture failed or was refused by the host
  #[error("capture error: {0}")]
  Capture(#[from] CaptureError),

  /// Canvas allocation, compositing, or image codec failure
  #[error("render error: {0}")]
  Render(#[from] RenderError),

  /// The page surface failed to scroll or report state
  #[error("page error: {0}")]
  Page(#[from] PageError),

  /// Malformed annotation payload from the UI boundary
  #[error("invalid annotation payload: {0}")]
  Annotations(#[from] serde_json::Error),
}

impl Error {
  /// Returns true when the failure is a missing activeTab/host permission.
  ///
  /// The orchestrator skips every fallback for these: a fallback capture
  /// would fail with the same permission error.
  pub fn is_permission_required(&self) -> bool {
    matches!(
      self,
      Error::Capture(CaptureError::PermissionRequired { .. })
    )
  }

  /// Returns true when the host reported too many capture calls.
  pub fn is_rate_limited(&self) -> bool {
    matches!(self, Error::Capture(CaptureError::RateLimited { .. }))
  }
}

/// Failures reported by (or while talking to) the capture primitive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
  /// The capture primitive lacks the transient permission for this tab
  #[error("activeTab permission required: {message}")]
  PermissionRequired { message: String },

  /// The host signalled too many capture calls in a short window
  #[error("capture rate limit hit: {message}")]
  RateLimited { message: String },

  /// Any other capture failure; retried with a short delay
  #[error("capture failed: {message}")]
  Failed { message: String },
}

impl CaptureError {
  /// The host-supplied (or synthesized) diagnostic message.
  pub fn message(&self) -> &str {
    match self {
      CaptureError::PermissionRequired { message }
      | CaptureError::RateLimited { message }
      | CaptureError::Failed { message } => message,
    }
  }
}

/// Compositing and codec failures
///
/// These are deterministic given their inputs and are never retried; the
/// orchestrator falls straight through to the next cheaper strategy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
  /// The platform refused a canvas of the requested size
  #[error("cannot allocate a {width}x{height} canvas")]
  CanvasUnavailable { width: u32, height: u32 },

  /// Image encoding failed
  #[error("failed to encode {format}: {reason}")]
  EncodeFailed { format: String, reason: String },

  /// A capture payload could not be decoded into a bitmap
  #[error("failed to decode capture payload: {reason}")]
  DecodeFailed { reason: String },
}

/// Failures raised by the page scroll surface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
  #[error("scroll to ({x}, {y}) failed: {reason}")]
  ScrollFailed { x: f32, y: f32, reason: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn permission_errors_are_distinguished() {
    let err = Error::from(CaptureError::PermissionRequired {
      message: "activeTab not granted".to_string(),
    });
    assert!(err.is_permission_required());
    assert!(!err.is_rate_limited());
  }

  #[test]
  fn rate_limit_errors_are_distinguished() {
    let err = Error::from(CaptureError::RateLimited {
      message: "too many calls".to_string(),
    });
    assert!(err.is_rate_limited());
    assert!(!err.is_permission_required());
  }

  #[test]
  fn render_errors_are_neither() {
    let err = Error::from(RenderError::DecodeFailed {
      reason: "not a png".to_string(),
    });
    assert!(!err.is_permission_required());
    assert!(!err.is_rate_limited());
  }

  #[test]
  fn capture_error_exposes_message() {
    let err = CaptureError::Failed {
      message: "boom".to_string(),
    };
    assert_eq!(err.message(), "boom");
  }
}
