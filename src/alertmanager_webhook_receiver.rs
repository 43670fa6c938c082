use std::{
	net::{IpAddr, SocketAddr},
	sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
	extract::Extension,
	http::StatusCode,
	routing::{get, post},
	Router,
};
use bytes::Bytes;
use prometheus::Registry;
use serde::Deserialize;

use crate::{relay::Relay, telemetry_endpoint};

#[derive(Debug, Deserialize, Clone)]
pub struct AlertReceiverSettings {
	pub bind_address: IpAddr,
	pub port: u16,
}

impl AlertReceiverSettings {
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}
}

async fn alertmanager_receiver(
	Extension(relay): Extension<Arc<Relay>>,
	body: Bytes,
) -> (StatusCode, String) {
	match relay.handle(&body).await {
		Ok(_) => (StatusCode::OK, String::from("ok")),
		Err(err) => (err.status_code(), err.to_string()),
	}
}

/// `POST /webhook` for alertmanager and `GET /metrics` for prometheus
pub fn router(relay: Arc<Relay>, registry: Registry) -> Router {
	Router::new()
		.route("/webhook", post(alertmanager_receiver))
		.route("/metrics", get(telemetry_endpoint::metrics_handler))
		.layer(Extension(relay))
		.layer(Extension(registry))
}

/// serves webhook and metrics until ctrl-c is pressed
pub async fn run_alertmanager_receiver(
	settings: &AlertReceiverSettings,
	relay: Arc<Relay>,
	registry: Registry,
) -> Result<()> {
	let addr = settings.to_socket_addr();
	let app = router(relay, registry);

	tracing::info!("listening on {}", addr);

	axum::Server::try_bind(&addr)
		.with_context(|| format!("failed to bind {addr}"))?
		.serve(app.into_make_service())
		.with_graceful_shutdown(shutdown_signal())
		.await
		.context("alertmanager endpoint crashed")?;

	Ok(())
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!("failed to listen for ctrl-c: {}", err);
		std::future::pending::<()>().await;
	}

	tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
	use axum::{body::Body, http::Request};
	use tower::ServiceExt;

	use super::*;
	use crate::{
		alert::tests::WEBHOOK_PAYLOAD,
		alert_renderer::{AlertRenderer, Templates},
		metrics::RelayMetrics,
		relay::tests::{RecordingSink, PANICKING_TOPIC_TEMPLATE},
	};

	fn app(templates: &Templates) -> (Router, Arc<RecordingSink>) {
		let registry = Registry::new();
		let metrics = RelayMetrics::new(&registry).expect("metrics register");
		let renderer = AlertRenderer::new(templates).expect("templates compile");
		let sink = Arc::new(RecordingSink::default());
		let relay = Relay::new(renderer, sink.clone(), String::from("alerts"), metrics);

		(router(Arc::new(relay), registry), sink)
	}

	async fn call(app: &Router, request: Request<Body>) -> (StatusCode, String) {
		let response = app.clone().oneshot(request).await.expect("infallible");
		let status = response.status();
		let body = hyper::body::to_bytes(response.into_body()).await.expect("body");
		(status, String::from_utf8(body.to_vec()).expect("utf8"))
	}

	fn webhook(body: &str) -> Request<Body> {
		Request::post("/webhook")
			.header("content-type", "application/json")
			.body(Body::from(body.to_owned()))
			.expect("valid request")
	}

	fn metrics() -> Request<Body> {
		Request::get("/metrics").body(Body::empty()).expect("valid request")
	}

	#[tokio::test]
	async fn webhook_answers_ok() {
		let (app, sink) = app(&Templates::default());

		assert_eq!(call(&app, webhook(WEBHOOK_PAYLOAD)).await, (StatusCode::OK, String::from("ok")));
		assert_eq!(sink.messages.lock().expect("not poisoned").len(), 1);

		let (status, text) = call(&app, metrics()).await;
		assert_eq!(status, StatusCode::OK);
		assert!(text.contains(r#"zulip_alerts_sent_total{topic="HighCPU"} 1"#), "{text}");
	}

	#[tokio::test]
	async fn malformed_json_is_bad_request() {
		let (app, _) = app(&Templates::default());

		let (status, body) = call(&app, webhook(r#"{"status": "firing""#)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert!(body.contains("EOF"), "{body}");

		let (_, text) = call(&app, metrics()).await;
		assert!(text.contains(r#"zulip_errors_total{type="invalid input"} 1"#), "{text}");
	}

	#[tokio::test]
	async fn panicking_template_does_not_affect_other_requests() {
		let (app, sink) = app(&Templates {
			topic: PANICKING_TOPIC_TEMPLATE.to_owned(),
			message: Templates::default().message,
		});

		let bad = r#"{"status": "firing", "groupLabels": {"alertname": "A", "pattern": "["}}"#;
		let (status, _) = call(&app, webhook(bad)).await;
		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

		assert_eq!(call(&app, webhook(WEBHOOK_PAYLOAD)).await, (StatusCode::OK, String::from("ok")));
		assert_eq!(sink.messages.lock().expect("not poisoned").len(), 1);
	}

	#[tokio::test]
	async fn unknown_routes_are_not_found() {
		let (app, _) = app(&Templates::default());

		let request = Request::get("/webhook").body(Body::empty()).expect("valid request");
		assert_eq!(call(&app, request).await.0, StatusCode::METHOD_NOT_ALLOWED);

		let request = Request::post("/alerts").body(Body::empty()).expect("valid request");
		assert_eq!(call(&app, request).await.0, StatusCode::NOT_FOUND);
	}
}
