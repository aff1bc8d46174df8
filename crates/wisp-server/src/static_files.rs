//! Static file serving for any request that isn't a Wisp or WSProxy
//! websocket upgrade. The `Server:` header common to every response
//! (static or not) is attached by a layer in `routes::router`, not here.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::path::{Component, Path, PathBuf};

use crate::error::ServerError;

/// Reject any request path that, once its `.`/`..` components are resolved,
/// would leave `root`. No component is allowed to be `ParentDir`; this is
/// simpler than canonicalizing (which requires the file to already exist)
/// and rejects escape attempts before ever touching the filesystem.
fn resolve_within(root: &Path, request_path: &str) -> Result<PathBuf, ServerError> {
  let mut resolved = root.to_path_buf();
  for component in Path::new(request_path.trim_start_matches('/')).components() {
    match component {
      Component::Normal(part) => resolved.push(part),
      Component::CurDir => {}
      Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
        return Err(ServerError::StaticPathEscape);
      }
    }
  }
  Ok(resolved)
}

pub async fn serve(static_dir: Option<&str>, request_path: &str) -> Response {
  match serve_inner(static_dir, request_path).await {
    Ok(response) => response,
    Err(err) => (
      StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
      err.to_string(),
    )
      .into_response(),
  }
}

async fn serve_inner(static_dir: Option<&str>, request_path: &str) -> Result<Response, ServerError> {
  let Some(static_dir) = static_dir else {
    return Ok(StatusCode::NO_CONTENT.into_response());
  };

  let root = Path::new(static_dir);
  let path = resolve_within(root, request_path)?;

  let path = if path.is_dir() {
    path.join("index.html")
  } else {
    path
  };

  let bytes = tokio::fs::read(&path).await.map_err(|err| {
    if err.kind() == std::io::ErrorKind::NotFound {
      ServerError::StaticPathMissing
    } else {
      ServerError::Io(err)
    }
  })?;

  let content_type = mime_guess::from_path(&path).first_or_octet_stream();
  let mut response = Body::from(bytes).into_response();
  response
    .headers_mut()
    .insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type.as_ref()).unwrap());
  Ok(response)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_parent_dir_escape() {
    let root = Path::new("/srv/static");
    assert!(matches!(
      resolve_within(root, "/../../etc/passwd"),
      Err(ServerError::StaticPathEscape)
    ));
  }

  #[test]
  fn allows_plain_relative_paths() {
    let root = Path::new("/srv/static");
    let resolved = resolve_within(root, "/css/app.css").unwrap();
    assert_eq!(resolved, Path::new("/srv/static/css/app.css"));
  }
}
