use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{
	alert_renderer::{Templates, DEFAULT_MESSAGE_TEMPLATE, DEFAULT_TOPIC_TEMPLATE},
	alertmanager_webhook_receiver::AlertReceiverSettings,
	log::LogSettings,
	zulip::ZulipSettings,
};

/// prefix of environment variables, e.g. `RELAY__ZULIP__PASSWORD`
const ENV_PREFIX: &str = "RELAY";

/// command line flags overriding a config key
const OVERRIDES: &[(&str, &str)] = &[
	("level", "log.level"),
	("url", "zulip.url"),
	("username", "zulip.username"),
	("password", "zulip.password"),
	("stream", "zulip.stream"),
	("topic-template", "templates.topic"),
	("message-template", "templates.message"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	pub receiver: AlertReceiverSettings,
	pub zulip: ZulipSettings,
	pub templates: Templates,
	pub log: LogSettings,
}

impl Settings {
	/// Reads command line arguments, config file and environment.
	pub fn load() -> Result<Self> {
		let environment = Environment::with_prefix(ENV_PREFIX).separator("__");
		Self::from_matches(&command().get_matches(), environment)
	}

	/// Layers defaults, config file, environment and command line flags, in
	/// this order.
	fn from_matches(opts: &ArgMatches, environment: Environment) -> Result<Self> {
		#[allow(clippy::expect_used)]
		let config_path = opts.value_of("config").expect("config has a default value");

		let mut builder = Config::builder()
			.set_default("receiver.bind_address", "0.0.0.0")?
			.set_default("receiver.port", 3000_i64)?
			.set_default("zulip.url", "https://team.zulipchat.com")?
			.set_default("zulip.username", "zulip@example.com")?
			.set_default("zulip.password", "hunter2")?
			.set_default("zulip.stream", "alerts")?
			.set_default("zulip.request_timeout", 10.0)?
			.set_default("templates.topic", DEFAULT_TOPIC_TEMPLATE)?
			.set_default("templates.message", DEFAULT_MESSAGE_TEMPLATE)?
			.set_default("log.level", "info")?
			.add_source(File::with_name(config_path).required(false))
			.add_source(environment);

		if let Some(port) = opts.value_of("port") {
			let port: u16 = port.parse().with_context(|| format!("invalid port {port:?}"))?;
			builder = builder.set_override("receiver.port", i64::from(port))?;
		}

		for &(flag, key) in OVERRIDES {
			if let Some(value) = opts.value_of(flag) {
				builder = builder.set_override(key, value)?;
			}
		}

		let settings = builder
			.build()
			.context("can't load config")?
			.try_deserialize()
			.context("can't load config")?;

		Ok(settings)
	}
}

fn command() -> Command<'static> {
	Command::new(clap::crate_name!())
		.version(clap::crate_version!())
		.about(clap::crate_description!())
		.author(clap::crate_authors!())
		.args([
			Arg::new("config")
				.help("path of config file")
				.takes_value(true)
				.short('c')
				.long("config")
				.default_value("./config.yaml"),
			Arg::new("level")
				.help("log level")
				.possible_values(["error", "warn", "info", "debug", "trace"])
				.ignore_case(true)
				.takes_value(true)
				.long("log"),
			Arg::new("port")
				.help("port of the webhook and metrics endpoint")
				.takes_value(true)
				.long("port"),
			Arg::new("url").help("url of the zulip server").takes_value(true).long("url"),
			Arg::new("username")
				.help("zulip user the alerts are posted as")
				.takes_value(true)
				.long("username"),
			Arg::new("password")
				.help("password or api key of the zulip user")
				.takes_value(true)
				.long("password"),
			Arg::new("stream")
				.help("zulip stream the alerts are posted to")
				.takes_value(true)
				.long("stream"),
			Arg::new("topic-template")
				.help("template rendering the message topic")
				.takes_value(true)
				.long("topic-template"),
			Arg::new("message-template")
				.help("template rendering the message content")
				.takes_value(true)
				.long("message-template"),
		])
}
