//! Client posting rendered alerts as zulip stream messages

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use thiserror::Error;

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
/// zulip server and account the alerts are posted with
pub struct ZulipSettings {
	/// base url of the zulip server
	pub url: Url,
	/// email of the bot account
	pub username: String,
	/// api key or password of the bot account
	pub password: String,
	/// stream all alerts are posted to
	pub stream: String,
	#[serde_as(as = "DurationSecondsWithFrac<f64>")]
	pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// a message for a zulip stream
pub struct StreamMessage {
	pub stream: String,
	pub topic: String,
	pub content: String,
}

/// Error while posting a message
#[derive(Error, Debug)]
pub enum TransportError {
	#[error("invalid zulip url {0}")]
	Endpoint(#[from] url::ParseError),
	#[error("failed to create request: {0}")]
	RequestCreation(#[source] reqwest::Error),
	#[error("request failed: {0}")]
	Request(#[source] reqwest::Error),
}

impl TransportError {
	/// `type` label of the errors counter
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Endpoint(_) | Self::RequestCreation(_) => "request creation error",
			Self::Request(_) => "request error",
		}
	}
}

/// Destination of rendered alerts
#[async_trait]
pub trait MessageSink: Send + Sync {
	async fn send(&self, message: &StreamMessage) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
/// [MessageSink] posting to the zulip `/api/v1/messages` endpoint
pub struct ZulipClient {
	client: reqwest::Client,
	endpoint: Url,
	username: String,
	password: String,
}

impl ZulipClient {
	pub fn new(settings: &ZulipSettings) -> Result<Self, TransportError> {
		let endpoint = Url::parse(&format!(
			"{}/api/v1/messages",
			settings.url.as_str().trim_end_matches('/')
		))?;

		let client = reqwest::Client::builder()
			.timeout(settings.request_timeout)
			.build()
			.map_err(TransportError::RequestCreation)?;

		Ok(Self {
			client,
			endpoint,
			username: settings.username.clone(),
			password: settings.password.clone(),
		})
	}

	/// form encoded, basic authenticated POST request for a stream message
	fn build_request(&self, message: &StreamMessage) -> Result<reqwest::Request, TransportError> {
		self.client
			.post(self.endpoint.clone())
			.basic_auth(&self.username, Some(&self.password))
			.form(&[
				("type", "stream"),
				("to", message.stream.as_str()),
				("topic", message.topic.as_str()),
				("content", message.content.as_str()),
			])
			.build()
			.map_err(TransportError::RequestCreation)
	}
}

#[async_trait]
impl MessageSink for ZulipClient {
	async fn send(&self, message: &StreamMessage) -> Result<(), TransportError> {
		let request = self.build_request(message)?;

		self.client
			.execute(request)
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(TransportError::Request)?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

	use super::*;

	fn settings(url: &str) -> ZulipSettings {
		ZulipSettings {
			url: Url::parse(url).expect("valid url"),
			username: String::from("alertbot@example.com"),
			password: String::from("secret"),
			stream: String::from("alerts"),
			request_timeout: Duration::from_secs(5),
		}
	}

	fn message() -> StreamMessage {
		StreamMessage {
			stream: String::from("alerts"),
			topic: String::from("HighCPU"),
			content: String::from("[FIRING:1] HighCPU & more"),
		}
	}

	#[test]
	fn endpoint_appends_api_path() {
		for url in ["https://team.zulipchat.com", "https://team.zulipchat.com/"] {
			let client = ZulipClient::new(&settings(url)).expect("client builds");
			assert_eq!(client.endpoint.as_str(), "https://team.zulipchat.com/api/v1/messages");
		}

		let client = ZulipClient::new(&settings("https://example.com/zulip")).expect("client builds");
		assert_eq!(client.endpoint.as_str(), "https://example.com/zulip/api/v1/messages");
	}

	#[test]
	fn request_is_form_encoded_with_basic_auth() {
		let client = ZulipClient::new(&settings("https://team.zulipchat.com")).expect("client builds");

		let request = client.build_request(&message()).expect("request builds");

		assert_eq!(request.method(), reqwest::Method::POST);
		assert_eq!(request.url().as_str(), "https://team.zulipchat.com/api/v1/messages");
		assert_eq!(request.headers()[CONTENT_TYPE], "application/x-www-form-urlencoded");
		assert_eq!(
			request.headers()[AUTHORIZATION],
			format!("Basic {}", base64::encode("alertbot@example.com:secret")).as_str()
		);

		let body = request.body().and_then(reqwest::Body::as_bytes).expect("buffered body");
		assert_eq!(
			std::str::from_utf8(body).expect("utf8"),
			"type=stream&to=alerts&topic=HighCPU&content=%5BFIRING%3A1%5D+HighCPU+%26+more"
		);
	}

	#[tokio::test]
	async fn unreachable_server_is_a_request_error() {
		// port was free a moment ago and nothing listens on it anymore
		let port = {
			let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("free port");
			listener.local_addr().expect("bound address").port()
		};
		let client =
			ZulipClient::new(&settings(&format!("http://127.0.0.1:{port}"))).expect("client builds");

		let err = client.send(&message()).await.expect_err("connection refused");

		assert_eq!(err.kind(), "request error");
	}
}
