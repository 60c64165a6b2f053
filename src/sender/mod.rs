pub mod client;
pub mod transmission;

pub use client::{ClientConfig, ClientError, HttpClient};
pub use transmission::HttpBatchSender;

use bytes::Bytes;

/// Performs the network transmission of one serialized batch payload.
///
/// The transport details (method, headers, auth, interception) are the
/// sender's concern; the engine only learns whether the attempt succeeded.
pub trait BatchSender: Send + Sync + 'static {
    fn send_batch(&self, payload: Bytes) -> impl Future<Output = bool> + Send;
    fn set_user_token(&self, token: Option<String>);
}

/// Hook for host applications to mutate outgoing requests (extra headers,
/// URL rewriting) before they are sent.
pub trait RequestInterceptor: Send + Sync + 'static {
    fn intercept(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder;
}

pub struct NoOpInterceptor;

impl RequestInterceptor for NoOpInterceptor {
    fn intercept(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
    }
}
