//! Rate-limited viewport capture client
//!
//! Wraps the host's single-shot "capture the currently visible viewport"
//! primitive with a process-wide minimum call interval and a small bounded
//! retry loop. The host rate limit is global, so the interval is measured
//! from the previous underlying attempt regardless of which call made it
//! and regardless of whether it succeeded; a failing retry loop therefore
//! cannot burst past the limit.
//!
//! Failure classification is driven by the enumerated `errorCode` contract
//! on the wire response. Hosts that only supply a free-form error string are
//! handled by a substring heuristic as a last resort.

use crate::clock::Clock;
use crate::error::{CaptureError, Error, Result};
use crate::image_output::decode_frame;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiny_skia::Pixmap;

/// Machine-readable failure classification supplied by the capture host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureErrorCode {
  #[serde(rename = "activeTab-required")]
  ActiveTabRequired,
  #[serde(rename = "capture-rate-limited")]
  RateLimited,
}

/// Wire response of the capture primitive
///
/// `data` is a base64 image data URL when the capture succeeded. `errorCode`
/// is the sole authoritative failure classification; an `error` string
/// without a code is treated as a generic transient failure (subject to the
/// message heuristic).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
  #[serde(default)]
  pub data: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_code: Option<CaptureErrorCode>,
}

impl CaptureResponse {
  /// A successful response carrying the given payload.
  pub fn ok(data: impl Into<String>) -> Self {
    Self {
      data: data.into(),
      error: None,
      error_code: None,
    }
  }

  /// A failed response with an optional machine-readable code.
  pub fn failed(error: impl Into<String>, error_code: Option<CaptureErrorCode>) -> Self {
    Self {
      data: String::new(),
      error: Some(error.into()),
      error_code,
    }
  }
}

/// The host capture primitive: one screenshot of the visible viewport
pub trait ViewportCapture {
  fn request_viewport_capture(&mut self) -> CaptureResponse;
}

// Allow boxed primitives to be used directly
impl<T: ViewportCapture + ?Sized> ViewportCapture for Box<T> {
  fn request_viewport_capture(&mut self) -> CaptureResponse {
    (**self).request_viewport_capture()
  }
}

/// Throttle and retry tuning for the capture client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
  /// Minimum gap between successive underlying capture calls
  pub min_interval: Duration,
  /// Wait before retrying after the host signalled a rate limit
  pub rate_limit_backoff: Duration,
  /// Wait before retrying any other transient failure
  pub retry_delay: Duration,
  /// Retries after the first attempt (2 retries = 3 attempts total)
  pub max_retries: u32,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      min_interval: Duration::from_millis(1100),
      rate_limit_backoff: Duration::from_millis(1400),
      retry_delay: Duration::from_millis(180),
      max_retries: 2,
    }
  }
}

/// Classifies a host error message when no `errorCode` was supplied.
///
/// Last-resort heuristic only; the enumerated contract is authoritative.
pub fn classify_error_message(message: &str) -> CaptureError {
  let lower = message.to_ascii_lowercase();
  if lower.contains("activetab") || lower.contains("permission") {
    CaptureError::PermissionRequired {
      message: message.to_string(),
    }
  } else if lower.contains("rate") || lower.contains("quota") || lower.contains("per second") {
    CaptureError::RateLimited {
      message: message.to_string(),
    }
  } else {
    CaptureError::Failed {
      message: message.to_string(),
    }
  }
}

fn classify_response(response: CaptureResponse) -> std::result::Result<String, CaptureError> {
  if let Some(code) = response.error_code {
    let message = response
      .error
      .unwrap_or_else(|| "capture refused by host".to_string());
    return Err(match code {
      CaptureErrorCode::ActiveTabRequired => CaptureError::PermissionRequired { message },
      CaptureErrorCode::RateLimited => CaptureError::RateLimited { message },
    });
  }

  if let Some(error) = response.error.filter(|e| !e.is_empty()) {
    return Err(classify_error_message(&error));
  }

  if response.data.is_empty() {
    return Err(CaptureError::Failed {
      message: "capture returned an empty payload".to_string(),
    });
  }

  Ok(response.data)
}

/// Throttled, retrying wrapper around a [`ViewportCapture`] primitive
///
/// One instance per export context; the last-attempt timestamp is owned
/// state, not a process global, so parallel test runs cannot leak throttle
/// history into each other.
pub struct RateLimitedClient {
  primitive: Box<dyn ViewportCapture>,
  clock: Arc<dyn Clock>,
  config: RateLimitConfig,
  last_attempt: Option<Instant>,
}

impl RateLimitedClient {
  pub fn new(primitive: Box<dyn ViewportCapture>, clock: Arc<dyn Clock>) -> Self {
    Self {
      primitive,
      clock,
      config: RateLimitConfig::default(),
      last_attempt: None,
    }
  }

  pub fn with_config(mut self, config: RateLimitConfig) -> Self {
    self.config = config;
    self
  }

  pub fn config(&self) -> &RateLimitConfig {
    &self.config
  }

  /// Captures the currently visible viewport as a decoded bitmap.
  ///
  /// Waits out the throttle window, then attempts the capture up to
  /// `1 + max_retries` times. Permission failures are returned immediately
  /// without retrying. A payload that arrives but fails to decode is a
  /// deterministic error and is not retried either.
  pub fn capture(&mut self) -> Result<Pixmap> {
    let mut last_error = CaptureError::Failed {
      message: "no capture attempt was made".to_string(),
    };

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = match &last_error {
          CaptureError::RateLimited { .. } => self.config.rate_limit_backoff,
          _ => self.config.retry_delay,
        };
        debug!(
          "capture attempt {} failed ({}); retrying in {:?}",
          attempt,
          last_error.message(),
          delay
        );
        self.clock.sleep(delay);
      }

      self.wait_for_slot();
      let response = self.primitive.request_viewport_capture();
      // Failed attempts count against the host rate limit too.
      self.last_attempt = Some(self.clock.now());

      match classify_response(response) {
        Ok(data) => return decode_frame(&data),
        Err(err @ CaptureError::PermissionRequired { .. }) => return Err(Error::Capture(err)),
        Err(err) => last_error = err,
      }
    }

    Err(Error::Capture(last_error))
  }

  fn wait_for_slot(&self) {
    if let Some(last) = self.last_attempt {
      let elapsed = self.clock.now().saturating_duration_since(last);
      if elapsed < self.config.min_interval {
        let wait = self.config.min_interval - elapsed;
        debug!("throttling capture for {:?}", wait);
        self.clock.sleep(wait);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::color::Rgba;
  use crate::image_output::{encode_data_url, OutputFormat};
  use std::sync::Mutex;

  /// Deterministic clock: sleeping advances virtual time instantly.
  struct ManualClock {
    start: Instant,
    state: Mutex<ManualClockState>,
  }

  #[derive(Default)]
  struct ManualClockState {
    offset: Duration,
    sleeps: Vec<Duration>,
  }

  impl ManualClock {
    fn new() -> Self {
      Self {
        start: Instant::now(),
        state: Mutex::new(ManualClockState::default()),
      }
    }

    fn sleeps(&self) -> Vec<Duration> {
      self.state.lock().unwrap().sleeps.clone()
    }
  }

  impl Clock for ManualClock {
    fn now(&self) -> Instant {
      self.start + self.state.lock().unwrap().offset
    }

    fn sleep(&self, duration: Duration) {
      let mut state = self.state.lock().unwrap();
      state.offset += duration;
      state.sleeps.push(duration);
    }
  }

  struct ScriptedCapture {
    responses: Vec<CaptureResponse>,
    calls: Arc<Mutex<usize>>,
  }

  impl ScriptedCapture {
    fn new(responses: Vec<CaptureResponse>) -> (Self, Arc<Mutex<usize>>) {
      let calls = Arc::new(Mutex::new(0));
      (
        Self {
          responses,
          calls: Arc::clone(&calls),
        },
        calls,
      )
    }
  }

  impl ViewportCapture for ScriptedCapture {
    fn request_viewport_capture(&mut self) -> CaptureResponse {
      let mut calls = self.calls.lock().unwrap();
      let response = self
        .responses
        .get(*calls)
        .cloned()
        .unwrap_or_else(|| CaptureResponse::failed("script exhausted", None));
      *calls += 1;
      response
    }
  }

  fn frame_url() -> String {
    let mut pixmap = Pixmap::new(4, 4).unwrap();
    pixmap.fill(Rgba::rgb(10, 200, 30).to_skia());
    encode_data_url(&pixmap, OutputFormat::Png).unwrap()
  }

  fn client_with(
    responses: Vec<CaptureResponse>,
    clock: Arc<ManualClock>,
  ) -> (RateLimitedClient, Arc<Mutex<usize>>) {
    let (primitive, calls) = ScriptedCapture::new(responses);
    (RateLimitedClient::new(Box::new(primitive), clock), calls)
  }

  #[test]
  fn successful_capture_decodes_frame() {
    let clock = Arc::new(ManualClock::new());
    let (mut client, _) = client_with(vec![CaptureResponse::ok(frame_url())], clock);
    let pixmap = client.capture().unwrap();
    assert_eq!((pixmap.width(), pixmap.height()), (4, 4));
  }

  #[test]
  fn two_transient_failures_then_success() {
    let clock = Arc::new(ManualClock::new());
    let (mut client, calls) = client_with(
      vec![
        CaptureResponse::failed("blip", None),
        CaptureResponse::failed("blip", None),
        CaptureResponse::ok(frame_url()),
      ],
      Arc::clone(&clock),
    );
    assert!(client.capture().is_ok());
    assert_eq!(*calls.lock().unwrap(), 3);
    // Two short retry delays, plus throttle waits between attempts.
    let sleeps = clock.sleeps();
    let retry_delay = RateLimitConfig::default().retry_delay;
    assert_eq!(sleeps.iter().filter(|d| **d == retry_delay).count(), 2);
  }

  #[test]
  fn retries_exhaust_with_last_error() {
    let clock = Arc::new(ManualClock::new());
    let (mut client, calls) = client_with(
      vec![
        CaptureResponse::failed("a", None),
        CaptureResponse::failed("b", None),
        CaptureResponse::failed("c", None),
      ],
      clock,
    );
    let err = client.capture().unwrap_err();
    match err {
      Error::Capture(CaptureError::Failed { message }) => assert_eq!(message, "c"),
      other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*calls.lock().unwrap(), 3);
  }

  #[test]
  fn permission_error_is_not_retried() {
    let clock = Arc::new(ManualClock::new());
    let (mut client, calls) = client_with(
      vec![CaptureResponse::failed(
        "activeTab not granted",
        Some(CaptureErrorCode::ActiveTabRequired),
      )],
      clock,
    );
    let err = client.capture().unwrap_err();
    assert!(err.is_permission_required());
    assert_eq!(*calls.lock().unwrap(), 1);
  }

  #[test]
  fn rate_limited_failures_use_the_longer_backoff() {
    let clock = Arc::new(ManualClock::new());
    let (mut client, _) = client_with(
      vec![
        CaptureResponse::failed("too many", Some(CaptureErrorCode::RateLimited)),
        CaptureResponse::ok(frame_url()),
      ],
      Arc::clone(&clock),
    );
    assert!(client.capture().is_ok());
    let backoff = RateLimitConfig::default().rate_limit_backoff;
    assert!(clock.sleeps().contains(&backoff));
  }

  #[test]
  fn back_to_back_captures_respect_min_interval() {
    let clock = Arc::new(ManualClock::new());
    let (mut client, _) = client_with(
      vec![
        CaptureResponse::ok(frame_url()),
        CaptureResponse::ok(frame_url()),
      ],
      Arc::clone(&clock),
    );
    client.capture().unwrap();
    client.capture().unwrap();

    let min_interval = RateLimitConfig::default().min_interval;
    assert!(
      clock.sleeps().iter().any(|d| *d >= min_interval),
      "second capture should have waited out the throttle window"
    );
  }

  #[test]
  fn heuristic_classification_without_error_code() {
    assert!(matches!(
      classify_error_message("The 'activeTab' permission is not in effect"),
      CaptureError::PermissionRequired { .. }
    ));
    assert!(matches!(
      classify_error_message("tab capture exceeded quota"),
      CaptureError::RateLimited { .. }
    ));
    assert!(matches!(
      classify_error_message("Tabs cannot be captured more than once per second"),
      CaptureError::RateLimited { .. }
    ));
    assert!(matches!(
      classify_error_message("something odd happened"),
      CaptureError::Failed { .. }
    ));
  }

  #[test]
  fn empty_payload_without_error_is_a_failure() {
    let clock = Arc::new(ManualClock::new());
    let (mut client, _) = client_with(vec![CaptureResponse::ok("")], clock);
    assert!(client.capture().is_err());
  }

  #[test]
  fn response_wire_format_uses_camel_case_codes() {
    let json = r#"{"data":"","error":"denied","errorCode":"activeTab-required"}"#;
    let response: CaptureResponse = serde_json::from_str(json).unwrap();
    assert_eq!(response.error_code, Some(CaptureErrorCode::ActiveTabRequired));

    let json = r#"{"data":"","errorCode":"capture-rate-limited"}"#;
    let response: CaptureResponse = serde_json::from_str(json).unwrap();
    assert_eq!(response.error_code, Some(CaptureErrorCode::RateLimited));
  }
}
