//! Decodes webhook payloads, renders them and forwards the result to zulip.

use std::{
	any::Any,
	panic::{self, AssertUnwindSafe},
	sync::Arc,
};

use http::StatusCode;
use thiserror::Error;

use crate::{
	alert::AlertGroup,
	alert_renderer::{AlertRenderer, RenderError, RenderedAlert},
	metrics::RelayMetrics,
	zulip::{MessageSink, StreamMessage, TransportError},
};

/// Error while relaying a single webhook call
#[derive(Error, Debug)]
pub enum RelayError {
	#[error("{0}")]
	Decode(#[from] serde_json::Error),
	#[error("{0}")]
	Render(#[from] RenderError),
	/// a template helper panicked, e.g. `reReplaceAll` with an invalid
	/// pattern taken from the alert group
	#[error("template rendering panicked: {0}")]
	RenderPanicked(String),
	#[error("{0}")]
	Transport(#[from] TransportError),
}

impl RelayError {
	/// `type` label of the errors counter
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Decode(_) => "invalid input",
			Self::Render(_) | Self::RenderPanicked(_) => "template error",
			Self::Transport(err) => err.kind(),
		}
	}

	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::Decode(_) => StatusCode::BAD_REQUEST,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// Everything needed to handle webhook calls. Immutable after construction
/// and shared between all requests.
pub struct Relay {
	renderer: AlertRenderer,
	sink: Arc<dyn MessageSink>,
	stream: String,
	metrics: RelayMetrics,
}

impl Relay {
	/// # Arguments
	///
	/// * `renderer` - compiled topic and message templates
	///
	/// * `sink` - where rendered alerts are posted to
	///
	/// * `stream` - zulip stream of all posted messages
	///
	/// * `metrics` - counters for sent alerts and errors
	pub fn new(
		renderer: AlertRenderer,
		sink: Arc<dyn MessageSink>,
		stream: String,
		metrics: RelayMetrics,
	) -> Self {
		Self { renderer, sink, stream, metrics }
	}

	/// Handles one webhook call: decode, render, forward. Every outcome is
	/// counted and logged.
	pub async fn handle(&self, body: &[u8]) -> Result<RenderedAlert, RelayError> {
		let result = match Self::decode(body) {
			Ok(group) => self.forward(&group).await,
			Err(err) => Err(err),
		};

		match &result {
			Ok(rendered) => {
				self.metrics.record_sent(&rendered.topic);
				tracing::info!(topic = rendered.topic.as_str(), "alert sent");
			}
			Err(err @ RelayError::RenderPanicked(_)) => {
				self.metrics.record_error(err.kind());
				tracing::error!(kind = err.kind(), "failed to relay alert: {}", err);
			}
			Err(err) => {
				self.metrics.record_error(err.kind());
				tracing::warn!(kind = err.kind(), "failed to relay alert: {}", err);
			}
		}

		result
	}

	pub fn decode(body: &[u8]) -> Result<AlertGroup, RelayError> {
		Ok(serde_json::from_slice(body)?)
	}

	/// Renders an alert group and posts it to the configured stream.
	pub async fn forward(&self, group: &AlertGroup) -> Result<RenderedAlert, RelayError> {
		let rendered = self.render(group)?;

		let message = StreamMessage {
			stream: self.stream.clone(),
			topic: rendered.topic.clone(),
			content: rendered.message.clone(),
		};
		self.sink.send(&message).await?;

		Ok(rendered)
	}

	/// renders with a panicking helper confined to this alert group
	fn render(&self, group: &AlertGroup) -> Result<RenderedAlert, RelayError> {
		match panic::catch_unwind(AssertUnwindSafe(|| self.renderer.render(group))) {
			Ok(rendered) => Ok(rendered?),
			Err(payload) => Err(RelayError::RenderPanicked(panic_message(payload.as_ref()))),
		}
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_owned()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		String::from("unknown panic")
	}
}
