//! Network seam of the transport
//!
//! [`RealtimeApi`] is everything the transport needs from the server;
//! [`HttpApi`] implements it over reqwest.

use crate::config::TransportConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use courier_common::api::SESSION_COOKIE;
use courier_common::{
    ConnectResponse, ErrorBody, Event, Message, PollResponse, SendMessageRequest, UserRequest,
};
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait RealtimeApi: Send + Sync + 'static {
    async fn connect(&self, user_id: &str) -> Result<ConnectResponse>;

    async fn disconnect(&self, user_id: &str) -> Result<()>;

    /// One long-poll; the server holds the request for at most `wait`.
    async fn poll(&self, user_id: &str, wait: Duration, ack: Option<u64>) -> Result<Vec<Event>>;

    async fn send_message(&self, conversation_id: &str, request: &SendMessageRequest)
        -> Result<Message>;

    async fn mark_read(&self, message_id: &str) -> Result<()>;

    async fn join(&self, conversation_id: &str) -> Result<()>;

    async fn leave(&self, conversation_id: &str) -> Result<()>;

    async fn ping(&self, user_id: &str) -> Result<Event>;
}

pub struct HttpApi {
    client: Client,
    base_url: String,
    session_token: Option<String>,
    request_timeout: Duration,
}

impl HttpApi {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        // Validate early so a typo fails at construction, not on first poll.
        Url::parse(&config.base_url)?;

        Ok(Self {
            client: Client::builder().build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_token: config.session_token.clone(),
            request_timeout: config.request_timeout,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded as a single
    /// path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, timeout: Duration) -> RequestBuilder {
        let mut builder = self.client.request(method, url).timeout(timeout);
        if let Some(token) = &self.session_token {
            builder = builder.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token));
        }
        builder
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        check_status(response).await
    }

    async fn post_empty(&self, segments: &[&str]) -> Result<()> {
        let url = self.endpoint(segments)?;
        self.execute(self.request(Method::POST, url, self.request_timeout))
            .await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::Unauthorized(status.as_u16()));
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error.message,
        Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
    };
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RealtimeApi for HttpApi {
    async fn connect(&self, user_id: &str) -> Result<ConnectResponse> {
        let url = self.endpoint(&["api", "realtime", "connect"])?;
        let body = UserRequest {
            user_id: user_id.to_string(),
        };
        let response = self
            .execute(self.request(Method::POST, url, self.request_timeout).json(&body))
            .await?;
        Ok(response.json().await?)
    }

    async fn disconnect(&self, user_id: &str) -> Result<()> {
        let url = self.endpoint(&["api", "realtime", "disconnect"])?;
        let body = UserRequest {
            user_id: user_id.to_string(),
        };
        self.execute(self.request(Method::POST, url, self.request_timeout).json(&body))
            .await?;
        Ok(())
    }

    async fn poll(&self, user_id: &str, wait: Duration, ack: Option<u64>) -> Result<Vec<Event>> {
        let mut url = self.endpoint(&["api", "realtime", "poll"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("userId", user_id);
            query.append_pair("timeout", &wait.as_millis().to_string());
            if let Some(ack) = ack {
                query.append_pair("ack", &ack.to_string());
            }
        }

        debug!("[HttpApi] GET {}", url);
        let response = self
            .execute(self.request(Method::GET, url, wait + self.request_timeout))
            .await?;
        let body: PollResponse = response.json().await?;
        Ok(body.messages)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        request: &SendMessageRequest,
    ) -> Result<Message> {
        let url = self.endpoint(&["api", "conversations", conversation_id, "messages"])?;
        let response = self
            .execute(self.request(Method::POST, url, self.request_timeout).json(request))
            .await?;
        Ok(response.json().await?)
    }

    async fn mark_read(&self, message_id: &str) -> Result<()> {
        self.post_empty(&["api", "messages", message_id, "read"])
            .await
    }

    async fn join(&self, conversation_id: &str) -> Result<()> {
        self.post_empty(&["api", "conversations", conversation_id, "join"])
            .await
    }

    async fn leave(&self, conversation_id: &str) -> Result<()> {
        self.post_empty(&["api", "conversations", conversation_id, "leave"])
            .await
    }

    async fn ping(&self, user_id: &str) -> Result<Event> {
        let url = self.endpoint(&["api", "realtime", "ping"])?;
        let body = UserRequest {
            user_id: user_id.to_string(),
        };
        let response = self
            .execute(self.request(Method::POST, url, self.request_timeout).json(&body))
            .await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_base_url() {
        let config = TransportConfig::new("not a url");
        assert!(matches!(HttpApi::new(&config), Err(ClientError::Url(_))));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = HttpApi::new(&TransportConfig::new("http://localhost:3001/")).unwrap();
        let url = api.endpoint(&["api", "realtime", "poll"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/api/realtime/poll");
    }

    #[test]
    fn test_ids_are_encoded_as_one_segment() {
        let api = HttpApi::new(&TransportConfig::new("http://localhost:3001/prefix/")).unwrap();
        let url = api
            .endpoint(&["api", "conversations", "../a?b/c#d", "join"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3001/prefix/api/conversations/..%2Fa%3Fb%2Fc%23d/join"
        );
        assert_eq!(url.path_segments().unwrap().count(), 5);
        assert!(url.query().is_none());
    }
}
