//! prometheus meters for the relay

use prometheus::{opts, register_int_counter_vec_with_registry, IntCounterVec, Registry};

#[derive(Debug, Clone)]
/// prometheus meters for forwarded alert groups
pub struct RelayMetrics {
	/// number of failed webhook calls by error kind
	pub(crate) errors: IntCounterVec,
	/// number of alert groups posted to zulip by topic
	pub(crate) alerts_sent: IntCounterVec,
}

impl RelayMetrics {
	/// construct prometheus meters and register them with `registry`
	pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		let errors = register_int_counter_vec_with_registry!(
			opts!("errors_total", "number of errors while trying to send alerts").namespace("zulip"),
			&["type"],
			registry
		)?;

		let alerts_sent = register_int_counter_vec_with_registry!(
			opts!("alerts_sent_total", "total number of alert groups sent").namespace("zulip"),
			&["topic"],
			registry
		)?;

		Ok(Self { errors, alerts_sent })
	}

	/// counts a failed webhook call
	pub fn record_error(&self, kind: &str) {
		self.errors.with_label_values(&[kind]).inc();
	}

	/// counts an alert group posted under `topic`
	pub fn record_sent(&self, topic: &str) {
		self.alerts_sent.with_label_values(&[topic]).inc();
	}
}
