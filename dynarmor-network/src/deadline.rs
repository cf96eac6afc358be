use crate::Error;
use std::{future::Future, io, time::Duration};

/// default idle timeout applied to every read and write of the handshake
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// run one IO operation of the handshake, bounded by `idle`
///
/// `operation` is the human readable description used in the returned
/// [`Error::Connection`] or [`Error::Timeout`].
pub(crate) async fn timed<F, T>(idle: Duration, operation: &'static str, future: F) -> Result<T, Error>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(idle, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(Error::Connection { operation, source }),
        Err(_elapsed) => Err(Error::Timeout { operation }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tokio::io::AsyncReadExt as _;

    #[tokio::test]
    async fn idle_read_times_out() {
        let (mut reader, _writer) = tokio::io::duplex(16);

        let error = timed(Duration::from_millis(20), "read", reader.read_u8())
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Timeout { operation: "read" }));
        assert_eq!(error.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn closed_stream_is_a_connection_error() {
        let (mut reader, writer) = tokio::io::duplex(16);
        drop(writer);

        let error = timed(IDLE_TIMEOUT, "read", reader.read_u8())
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Connection { .. }));
    }
}
