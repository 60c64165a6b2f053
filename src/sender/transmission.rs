use super::{BatchSender, NoOpInterceptor, RequestInterceptor};
use super::client::HttpClient;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use std::time::Instant;
use tracing::{debug, warn};

const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
const API_KEY_HEADER: &str = "X-Api-Key";
const USER_TOKEN_HEADER: &str = "X-User-Token";

/// Sender that POSTs serialized batch payloads to the collector endpoint.
///
/// Injects the API key on every request and the user token while one is
/// set; the interceptor gets the last word on the outgoing request.
pub struct HttpBatchSender {
    client: HttpClient,
    user_token: RwLock<Option<String>>,
    interceptor: Box<dyn RequestInterceptor>,
}

impl HttpBatchSender {
    pub fn new(client: HttpClient) -> Self {
        Self::with_interceptor(client, Box::new(NoOpInterceptor))
    }

    pub fn with_interceptor(client: HttpClient, interceptor: Box<dyn RequestInterceptor>) -> Self {
        Self {
            client,
            user_token: RwLock::new(None),
            interceptor,
        }
    }

    async fn transmit(&self, payload: Bytes) -> Result<bool, reqwest::Error> {
        let start = Instant::now();
        let bytes_sent = payload.len();

        let mut request = self
            .client
            .client
            .post(self.client.endpoint_url.clone())
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .header(API_KEY_HEADER, &self.client.api_key);
        if let Some(token) = self.user_token.read().clone() {
            request = request.header(USER_TOKEN_HEADER, token);
        }
        request = self.interceptor.intercept(request);

        let response = request.body(payload).send().await?;
        let status = response.status();
        let success = status.is_success();

        if success {
            debug!(
                "sent batch payload ({bytes_sent} bytes) in {:?}",
                start.elapsed()
            );
        } else {
            warn!("collector rejected batch payload: HTTP {status}");
        }
        Ok(success)
    }
}

impl BatchSender for HttpBatchSender {
    fn send_batch(&self, payload: Bytes) -> impl Future<Output = bool> + Send {
        async move {
            match self.transmit(payload).await {
                Ok(success) => success,
                Err(e) => {
                    warn!("batch transmission failed: {e}");
                    false
                }
            }
        }
    }

    fn set_user_token(&self, token: Option<String>) {
        *self.user_token.write() = token;
    }
}
