//! Body streaming and buffering.

use bytes::{Bytes, BytesMut};
use daedalus_core::problem::{Problem, ProblemKind};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use thiserror::Error;

/// A transport-level body read failure.
#[derive(Debug, Error)]
#[error("body read failed: {0}")]
pub struct BodyError(pub String);

/// The request body as a stream of chunks with back-pressure.
pub type BodyStream = BoxStream<'static, Result<Bytes, BodyError>>;

/// Wraps already-buffered bytes as a body stream.
#[must_use]
pub fn full_body(bytes: Bytes) -> BodyStream {
    futures_util::stream::once(async move { Ok(bytes) }).boxed()
}

/// An empty body stream.
#[must_use]
pub fn empty_body() -> BodyStream {
    futures_util::stream::empty().boxed()
}

/// Reads the whole body, enforcing the size limit chunk by chunk.
///
/// # Errors
///
/// Returns a payload-too-large problem past the limit, or an internal
/// problem on a transport failure.
pub async fn read_full(mut body: BodyStream, limit: usize) -> Result<Bytes, Problem> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| {
            Problem::new(ProblemKind::Internal).with_detail(e.to_string())
        })?;
        if buffer.len() + chunk.len() > limit {
            return Err(Problem::new(ProblemKind::PayloadTooLarge).with_detail(format!(
                "request body exceeds the {limit}-byte limit"
            )));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// Checks a wire content type against a declared media type, ignoring
/// parameters such as `charset` and `boundary`.
#[must_use]
pub fn media_type_matches(declared: &str, actual: &str) -> bool {
    let declared = declared.split(';').next().unwrap_or("").trim();
    let actual = actual.split(';').next().unwrap_or("").trim();
    declared.eq_ignore_ascii_case(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_full_within_limit() {
        let body = full_body(Bytes::from("hello"));
        let bytes = read_full(body, 16).await.unwrap();
        assert_eq!(bytes, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn test_read_full_over_limit() {
        let body = full_body(Bytes::from(vec![0u8; 32]));
        let problem = read_full(body, 16).await.unwrap_err();
        assert_eq!(problem.kind(), ProblemKind::PayloadTooLarge);
        assert_eq!(problem.status().as_u16(), 413);
    }

    #[tokio::test]
    async fn test_read_full_chunked() {
        let chunks = vec![Ok(Bytes::from("ab")), Ok(Bytes::from("cd"))];
        let body: BodyStream = futures_util::stream::iter(chunks).boxed();
        let bytes = read_full(body, 16).await.unwrap();
        assert_eq!(bytes, Bytes::from("abcd"));
    }

    #[test]
    fn test_media_type_matching() {
        assert!(media_type_matches("application/json", "application/json"));
        assert!(media_type_matches(
            "application/json",
            "application/JSON; charset=utf-8"
        ));
        assert!(media_type_matches(
            "multipart/form-data",
            "multipart/form-data; boundary=xyz"
        ));
        assert!(!media_type_matches("application/json", "text/plain"));
    }
}
