//! Renders alert groups via tera templates into a topic and a message.
//!
//! Both templates are compiled once at startup. Afterwards the renderer is
//! immutable and shared between all requests of the
//! [webhook receiver](crate::alertmanager_webhook_receiver).

use std::{error::Error as _, fmt};

use regex::Regex;
use serde::Deserialize;
use tera::{
	ast::{Expr, ExprVal, FunctionCall, Node},
	Tera,
};
use thiserror::Error;

use crate::{alert::AlertGroup, template_functions::FunctionLibrary};

/// groups which weren't grouped by `alertname` get the `<no value>` topic
pub const DEFAULT_TOPIC_TEMPLATE: &str = concat!(
	r#"{% if groupLabels.alertname is defined %}{{ groupLabels.alertname }}"#,
	r#"{% else %}<no value>{% endif %}"#,
);

pub const DEFAULT_MESSAGE_TEMPLATE: &str = concat!(
	r#"[{{ status | toUpper }}{% if status == "firing" %}:{{ firingAlerts | len }}{% endif %}] "#,
	r#"{{ groupLabels | values | join(sep=" ") }}"#,
	r#"{% set grouped = groupLabels | names %}"#,
	r#"{% set extra = commonLabels | remove(names=grouped) %}"#,
	r#"{% if extra | len > 0 %} ({{ extra | values | join(sep=" ") }}){% endif %}"#,
);

#[derive(Debug, Clone, Deserialize)]
/// template sources for topic and message
pub struct Templates {
	pub topic: String,
	pub message: String,
}

impl Default for Templates {
	fn default() -> Self {
		Self {
			topic: DEFAULT_TOPIC_TEMPLATE.to_owned(),
			message: DEFAULT_MESSAGE_TEMPLATE.to_owned(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// the two templates of a [AlertRenderer]
pub enum TemplateSlot {
	Topic,
	Message,
}

impl TemplateSlot {
	/// name of the template inside of tera
	fn name(&self) -> &'static str {
		match self {
			Self::Topic => "topic",
			Self::Message => "message",
		}
	}
}

impl fmt::Display for TemplateSlot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Error while compiling the templates. The relay can't serve any request
/// without both templates.
#[derive(Error, Debug)]
pub enum CompileError {
	#[error("failed to parse {slot} template: {message}")]
	Syntax { slot: TemplateSlot, message: String },
	#[error("{slot} template calls unknown function `{name}`")]
	UnknownFunction { slot: TemplateSlot, name: String },
	#[error("{slot} template passes invalid pattern {pattern:?} to `{function}`")]
	InvalidPattern {
		slot: TemplateSlot,
		function: String,
		pattern: String,
		#[source]
		source: regex::Error,
	},
}

/// Error while rendering a single alert group
#[derive(Error, Debug)]
pub enum RenderError {
	#[error("failed to build template context: {0}")]
	Context(String),
	#[error("failed to render {slot} template: {message}")]
	Template { slot: TemplateSlot, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// output of [AlertRenderer::render]
pub struct RenderedAlert {
	pub topic: String,
	pub message: String,
}

/// Alert renderer
#[derive(Debug)]
pub struct AlertRenderer {
	tera: Tera,
}

impl AlertRenderer {
	/// Compiles topic and message template against the standard
	/// [FunctionLibrary].
	pub fn new(templates: &Templates) -> Result<Self, CompileError> {
		Self::with_library(templates, &FunctionLibrary::standard())
	}

	/// Compiles topic and message template. Templates may only call helpers
	/// of `library`, string literal patterns are checked right away.
	///
	/// # Arguments
	///
	/// * `templates` - sources of the topic and message template
	///
	/// * `library` - the helpers available to both templates
	pub fn with_library(templates: &Templates, library: &FunctionLibrary) -> Result<Self, CompileError> {
		let mut tera = Tera::default();
		tera.autoescape_on(Vec::new());
		library.install(&mut tera);

		for (slot, source) in [
			(TemplateSlot::Topic, templates.topic.as_str()),
			(TemplateSlot::Message, templates.message.as_str()),
		] {
			tera.add_raw_template(slot.name(), source)
				.map_err(|err| CompileError::Syntax { slot, message: error_chain(&err) })?;

			let ast = &tera.templates[slot.name()].ast;
			validate_calls(slot, ast, library)?;
		}

		Ok(Self { tera })
	}

	/// Renders topic and message for an alert group.
	///
	/// # Panics
	///
	/// If `reReplaceAll` is called with a pattern computed from the alert
	/// group which isn't a valid regular expression.
	pub fn render(&self, group: &AlertGroup) -> Result<RenderedAlert, RenderError> {
		let context = tera::Context::from_serialize(group.template_data())
			.map_err(|err| RenderError::Context(error_chain(&err)))?;

		let render = |slot: TemplateSlot| {
			self.tera
				.render(slot.name(), &context)
				.map_err(|err| RenderError::Template { slot, message: error_chain(&err) })
		};

		Ok(RenderedAlert { topic: render(TemplateSlot::Topic)?, message: render(TemplateSlot::Message)? })
	}
}

/// tera wraps the interesting part of an error into its sources
fn error_chain(err: &tera::Error) -> String {
	let mut message = err.to_string();
	let mut source = err.source();
	while let Some(err) = source {
		message.push_str(": ");
		message.push_str(&err.to_string());
		source = err.source();
	}
	message
}

/// Checks that every filter and function a template calls is part of the
/// library and that literal patterns compile.
fn validate_calls(slot: TemplateSlot, ast: &[Node], library: &FunctionLibrary) -> Result<(), CompileError> {
	let mut calls = Vec::new();
	collect_nodes(ast, &mut calls);

	for call in calls {
		let helper = library
			.get(&call.name)
			.ok_or_else(|| CompileError::UnknownFunction { slot, name: call.name.clone() })?;

		if !helper.takes_pattern {
			continue;
		}

		if let Some(Expr { val: ExprVal::String(pattern), filters, .. }) = call.args.get("pattern") {
			if filters.is_empty() {
				Regex::new(pattern).map_err(|source| CompileError::InvalidPattern {
					slot,
					function: call.name.clone(),
					pattern: pattern.clone(),
					source,
				})?;
			}
		}
	}

	Ok(())
}

fn collect_nodes<'a>(nodes: &'a [Node], calls: &mut Vec<&'a FunctionCall>) {
	for node in nodes {
		match node {
			Node::VariableBlock(_, expr) => collect_expr(expr, calls),
			Node::Set(_, set) => collect_expr(&set.value, calls),
			Node::FilterSection(_, section, _) => {
				collect_call(&section.filter, calls);
				collect_nodes(&section.body, calls);
			}
			Node::Block(_, block, _) => collect_nodes(&block.body, calls),
			Node::MacroDefinition(_, definition, _) => collect_nodes(&definition.body, calls),
			Node::Forloop(_, forloop, _) => {
				collect_expr(&forloop.container, calls);
				collect_nodes(&forloop.body, calls);
				if let Some(body) = &forloop.empty_body {
					collect_nodes(body, calls);
				}
			}
			Node::If(branches, _) => {
				for (_, condition, body) in &branches.conditions {
					collect_expr(condition, calls);
					collect_nodes(body, calls);
				}
				if let Some((_, body)) = &branches.otherwise {
					collect_nodes(body, calls);
				}
			}
			_ => {}
		}
	}
}

fn collect_expr<'a>(expr: &'a Expr, calls: &mut Vec<&'a FunctionCall>) {
	collect_val(&expr.val, calls);
	for filter in &expr.filters {
		collect_call(filter, calls);
	}
}

fn collect_call<'a>(call: &'a FunctionCall, calls: &mut Vec<&'a FunctionCall>) {
	calls.push(call);
	for arg in call.args.values() {
		collect_expr(arg, calls);
	}
}

fn collect_val<'a>(val: &'a ExprVal, calls: &mut Vec<&'a FunctionCall>) {
	match val {
		ExprVal::FunctionCall(call) => collect_call(call, calls),
		ExprVal::Math(math) => {
			collect_expr(&math.lhs, calls);
			collect_expr(&math.rhs, calls);
		}
		ExprVal::Logic(logic) => {
			collect_expr(&logic.lhs, calls);
			collect_expr(&logic.rhs, calls);
		}
		ExprVal::In(within) => {
			collect_expr(&within.lhs, calls);
			collect_expr(&within.rhs, calls);
		}
		ExprVal::Test(test) => {
			for arg in &test.args {
				collect_expr(arg, calls);
			}
		}
		ExprVal::MacroCall(call) => {
			for arg in call.args.values() {
				collect_expr(arg, calls);
			}
		}
		ExprVal::Array(items) => {
			for item in items {
				collect_expr(item, calls);
			}
		}
		ExprVal::StringConcat(concat) => {
			for value in &concat.values {
				collect_val(value, calls);
			}
		}
		_ => {}
	}
}
