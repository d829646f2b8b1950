use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
  /* No term/graph behind an ID the backend handed out */
  #[error("Not found: {0}")]
  NotFound(String),

  #[error("Unsupported operation: {0}")]
  Unsupported(String),

  #[error("Node {node} already has ID {existing}, refusing to reassign it to {attempted}")]
  AlreadyAssigned { node: String, existing: i64, attempted: i64 },

  #[error("Update evaluation exceeded its timeout of {timeout_ms}ms ({elapsed_ms}ms elapsed)")]
  TimedOut { timeout_ms: u64, elapsed_ms: u64 },

  #[error("Invalid state: {0}")]
  InvalidState(String),

  #[error("Backend error: {0}")]
  Backend(#[source] Source),

  #[error("Update failed: {message}")]
  Update {
    message: String,
    #[source]
    source: Option<Box<Error>>,
  },

  #[error("Expected a {expected} node but the provider materialised a {actual} node")]
  WrongKind { expected: &'static str, actual: &'static str },

  #[error("Invalid configuration: {0}")]
  Config(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("RDF syntax error: {0}")]
  Parser(String),
}

impl Error {
  pub fn backend<E: Into<Source>>(err: E) -> Self {
    Error::Backend(err.into())
  }
  pub fn update(message: impl Into<String>) -> Self {
    Error::Update { message: message.into(), source: None }
  }
  pub fn update_caused_by(message: impl Into<String>, cause: Error) -> Self {
    Error::Update { message: message.into(), source: Some(Box::new(cause)) }
  }

  /// Stable code for callers that branch on the kind of failure
  pub fn code(&self) -> &'static str {
    match self {
      Error::NotFound(_) => "NOT_FOUND",
      Error::Unsupported(_) => "UNSUPPORTED",
      Error::AlreadyAssigned { .. } => "ALREADY_ASSIGNED",
      Error::TimedOut { .. } => "TIMED_OUT",
      Error::InvalidState(_) => "INVALID_STATE",
      Error::Backend(_) => "BACKEND",
      Error::Update { .. } => "UPDATE_FAILED",
      Error::WrongKind { .. } => "WRONG_KIND",
      Error::Config(_) => "INVALID_CONFIG",
      Error::Io(_) => "IO",
      Error::Json(_) => "JSON",
      Error::Parser(_) => "PARSER",
    }
  }
}

impl From<rio_turtle::TurtleError> for Error {
  fn from(err: rio_turtle::TurtleError) -> Error {
    Error::Parser(err.to_string())
  }
}
impl From<rio_xml::RdfXmlError> for Error {
  fn from(err: rio_xml::RdfXmlError) -> Error {
    Error::Parser(err.to_string())
  }
}

#[cfg(test)]
mod unit_tests {
  use super::*;
  #[test]
  fn codes_are_distinct_per_kind() {
    assert_eq!(Error::NotFound("x".into()).code(), "NOT_FOUND");
    assert_eq!(Error::TimedOut { timeout_ms: 1, elapsed_ms: 2 }.code(), "TIMED_OUT");
    assert_eq!(Error::backend("boom").code(), "BACKEND");
  }
  #[test]
  fn update_keeps_its_cause() {
    use std::error::Error as _;
    let err = Error::update_caused_by("could not delete", Error::Unsupported("no".into()));
    assert!(err.source().is_some());
    assert!(err.to_string().contains("could not delete"));
  }
}
