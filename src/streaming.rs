//! Byte-stream contract for incremental vendor output.
//!
//! The core delivers raw transport chunks in arrival order and guarantees
//! termination when the connection closes or the server signals
//! completion. Decoding the vendor's event framing (SSE `data:` lines for
//! the OpenAI family and Anthropic, JSON objects per chunk for Gemini) is
//! the caller's job.

use crate::http::HttpTransport;
use crate::providers::ProviderError;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::RequestBuilder;

/// Forward-only, single-pass, non-restartable sequence of raw transport
/// chunks. Dropping the stream closes the underlying connection and
/// releases any timers.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

/// Send `request` and normalize the response body into a [`ByteStream`].
///
/// The transport's timeout covers request start through response headers;
/// exceeding it raises [`ProviderError::RequestTimeout`] and aborts the
/// connection.
pub async fn open_byte_stream(
    transport: &HttpTransport,
    request: RequestBuilder,
) -> Result<ByteStream, ProviderError> {
    let response = match tokio::time::timeout(transport.timeout(), request.send()).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(transport.network_error(e)),
        Err(_) => {
            return Err(ProviderError::RequestTimeout {
                provider: transport.provider().to_string(),
                timeout: transport.timeout(),
            });
        }
    };
    let response = transport.check_status(response).await?;

    let provider = transport.provider().to_string();
    let stream = response.bytes_stream().map(move |chunk| {
        chunk.map_err(|e| ProviderError::Network {
            provider: provider.clone(),
            source: e,
        })
    });
    Ok(Box::pin(stream))
}
