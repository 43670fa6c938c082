//! prometheus alertmanager receiver that forwards alert groups into a zulip
//! stream
//!
//! Features:
//! - topic and message of every zulip message are rendered from configurable
//!   templates
//! - templates are validated at startup, including the regular expressions
//!   they contain
//! - prometheus counters for sent alerts and failures

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;

use crate::{
	alert_renderer::AlertRenderer,
	metrics::RelayMetrics,
	relay::Relay,
	settings::Settings,
	zulip::ZulipClient,
};

mod alert;
mod alert_renderer;
mod alertmanager_webhook_receiver;
mod label_set;
mod log;
mod metrics;
mod relay;
mod settings;
mod telemetry_endpoint;
mod template_functions;
mod zulip;

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	let settings = Settings::load().context("failed to load config and command line arguments")?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	let renderer = AlertRenderer::new(&settings.templates).context("failed to compile templates")?;
	tracing::info!("templates compiled");

	let registry = Registry::new();
	let metrics = RelayMetrics::new(&registry).context("failed to register metrics")?;

	let client = ZulipClient::new(&settings.zulip).context("failed to construct zulip client")?;

	let relay = Relay::new(renderer, Arc::new(client), settings.zulip.stream.clone(), metrics);

	alertmanager_webhook_receiver::run_alertmanager_receiver(&settings.receiver, Arc::new(relay), registry)
		.await
}
