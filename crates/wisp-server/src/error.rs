use thiserror::Error;

/// Errors surfaced by the HTTP/static-file surface around the core engine —
/// distinct from `wisp_core::error::WispError`, which only knows about the
/// protocol, not HTTP status codes.
#[derive(Debug, Error)]
pub enum ServerError {
  #[error("path escapes the static root")]
  StaticPathEscape,

  #[error("no such static file")]
  StaticPathMissing,

  #[error("static file serving is not configured")]
  StaticNotConfigured,

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
}

impl ServerError {
  pub fn status_code(&self) -> u16 {
    match self {
      ServerError::StaticPathEscape => 403,
      ServerError::StaticPathMissing => 404,
      ServerError::StaticNotConfigured => 204,
      ServerError::Io(_) => 500,
    }
  }
}
