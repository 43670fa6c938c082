//! data structures for deserializing incoming alert groups
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::label_set::LabelSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
/// lifecycle state of an alert or alert group
pub enum Status {
	Firing,
	Resolved,
}

impl Status {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Firing => "firing",
			Self::Resolved => "resolved",
		}
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// alert group sent by the alertmanager webhook notifier
#[allow(clippy::missing_docs_in_private_items)]
pub struct AlertGroup {
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub group_key: String,
	#[serde(default)]
	pub truncated_alerts: u64,
	#[serde(default)]
	pub receiver: String,
	pub status: Status,
	#[serde(default)]
	pub alerts: Vec<Alert>,
	/// labels the alerts were grouped by
	#[serde(default)]
	pub group_labels: LabelSet,
	/// labels shared by every alert of the group
	#[serde(default)]
	pub common_labels: LabelSet,
	#[serde(default)]
	pub common_annotations: LabelSet,
	#[serde(rename = "externalURL", default)]
	pub external_url: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	pub status: Status,
	#[serde(default)]
	pub labels: LabelSet,
	#[serde(default)]
	pub annotations: LabelSet,
	#[serde(default, deserialize_with = "zero_time_as_none")]
	pub starts_at: Option<DateTime<Utc>>,
	/// `None` while the alert is still firing
	#[serde(default, deserialize_with = "zero_time_as_none")]
	pub ends_at: Option<DateTime<Utc>>,
	#[serde(rename = "generatorURL", default)]
	pub generator_url: String,
	#[serde(default)]
	pub fingerprint: String,
}

/// alertmanager encodes unset timestamps as `0001-01-01T00:00:00Z`
fn zero_time_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
	D: Deserializer<'de>,
{
	let time = Option::<DateTime<Utc>>::deserialize(deserializer)?;

	Ok(time.filter(|time| time.year() > 1))
}

impl AlertGroup {
	/// alerts of the group which are still firing
	pub fn firing_alerts(&self) -> impl Iterator<Item = &Alert> {
		self.alerts.iter().filter(|alert| alert.status == Status::Firing)
	}

	/// alerts of the group which are resolved
	pub fn resolved_alerts(&self) -> impl Iterator<Item = &Alert> {
		self.alerts.iter().filter(|alert| alert.status == Status::Resolved)
	}

	/// Builds the root context templates are rendered against.
	pub fn template_data(&self) -> TemplateData<'_> {
		TemplateData {
			version: &self.version,
			group_key: &self.group_key,
			truncated_alerts: self.truncated_alerts,
			receiver: &self.receiver,
			status: self.status,
			alerts: &self.alerts,
			firing_alerts: self.firing_alerts().collect(),
			resolved_alerts: self.resolved_alerts().collect(),
			group_labels: &self.group_labels,
			common_labels: &self.common_labels,
			common_annotations: &self.common_annotations,
			external_url: &self.external_url,
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
/// [AlertGroup] together with its derived fields, as seen by templates
#[allow(clippy::missing_docs_in_private_items)]
pub struct TemplateData<'a> {
	version: &'a str,
	group_key: &'a str,
	truncated_alerts: u64,
	receiver: &'a str,
	status: Status,
	alerts: &'a [Alert],
	firing_alerts: Vec<&'a Alert>,
	resolved_alerts: Vec<&'a Alert>,
	group_labels: &'a LabelSet,
	common_labels: &'a LabelSet,
	common_annotations: &'a LabelSet,
	#[serde(rename = "externalURL")]
	external_url: &'a str,
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	/// webhook payload as sent by alertmanager
	pub(crate) const WEBHOOK_PAYLOAD: &str = r#"{
		"version": "4",
		"groupKey": "{}:{alertname=\"HighCPU\"}",
		"truncatedAlerts": 0,
		"status": "firing",
		"receiver": "zulip",
		"groupLabels": {"alertname": "HighCPU"},
		"commonLabels": {"alertname": "HighCPU", "severity": "critical"},
		"commonAnnotations": {"summary": "cpu usage above 90%"},
		"externalURL": "http://alertmanager:9093",
		"alerts": [
			{
				"status": "firing",
				"labels": {"alertname": "HighCPU", "severity": "critical", "instance": "node-1"},
				"annotations": {"summary": "cpu usage above 90%"},
				"startsAt": "2022-05-30T10:00:00Z",
				"endsAt": "0001-01-01T00:00:00Z",
				"generatorURL": "http://prometheus:9090/graph",
				"fingerprint": "a1"
			},
			{
				"status": "resolved",
				"labels": {"alertname": "HighCPU", "severity": "critical", "instance": "node-2"},
				"annotations": {},
				"startsAt": "2022-05-30T09:00:00Z",
				"endsAt": "2022-05-30T09:30:00Z",
				"generatorURL": "http://prometheus:9090/graph",
				"fingerprint": "a2"
			},
			{
				"status": "firing",
				"labels": {"alertname": "HighCPU", "severity": "critical", "instance": "node-3"},
				"annotations": {},
				"startsAt": "2022-05-30T10:05:00Z",
				"generatorURL": "http://prometheus:9090/graph",
				"fingerprint": "a3"
			}
		]
	}"#;

	pub(crate) fn alert(status: Status, labels: &[(&str, &str)]) -> Alert {
		Alert {
			status,
			labels: labels.iter().copied().collect(),
			annotations: LabelSet::default(),
			starts_at: None,
			ends_at: None,
			generator_url: String::new(),
			fingerprint: String::new(),
		}
	}

	pub(crate) fn group(
		status: Status,
		alerts: Vec<Alert>,
		group_labels: &[(&str, &str)],
		common_labels: &[(&str, &str)],
	) -> AlertGroup {
		AlertGroup {
			version: String::from("4"),
			group_key: String::new(),
			truncated_alerts: 0,
			receiver: String::from("zulip"),
			status,
			alerts,
			group_labels: group_labels.iter().copied().collect(),
			common_labels: common_labels.iter().copied().collect(),
			common_annotations: LabelSet::default(),
			external_url: String::new(),
		}
	}

	#[test]
	fn decodes_alertmanager_payload() {
		let group: AlertGroup = serde_json::from_str(WEBHOOK_PAYLOAD).expect("valid payload");

		assert_eq!(group.status, Status::Firing);
		assert_eq!(group.alerts.len(), 3);
		assert_eq!(group.group_labels.get("alertname"), Some("HighCPU"));
		assert_eq!(group.common_labels.names(), vec!["alertname", "severity"]);
		assert_eq!(group.external_url, "http://alertmanager:9093");
	}

	#[test]
	fn zero_and_missing_end_times_decode_to_none() {
		let group: AlertGroup = serde_json::from_str(WEBHOOK_PAYLOAD).expect("valid payload");

		assert!(group.alerts[0].ends_at.is_none());
		assert!(group.alerts[1].ends_at.is_some());
		assert!(group.alerts[2].ends_at.is_none());
		assert!(group.alerts[2].starts_at.is_some());
	}

	#[test]
	fn partitions_firing_and_resolved_alerts() {
		let group: AlertGroup = serde_json::from_str(WEBHOOK_PAYLOAD).expect("valid payload");

		let firing: Vec<_> = group.firing_alerts().map(|alert| alert.fingerprint.as_str()).collect();
		let resolved: Vec<_> =
			group.resolved_alerts().map(|alert| alert.fingerprint.as_str()).collect();

		assert_eq!(firing, vec!["a1", "a3"]);
		assert_eq!(resolved, vec!["a2"]);
	}

	#[test]
	fn minimal_payload_only_needs_status() {
		let group: AlertGroup =
			serde_json::from_str(r#"{"status": "resolved"}"#).expect("valid payload");

		assert_eq!(group.status, Status::Resolved);
		assert!(group.alerts.is_empty());
		assert!(group.group_labels.is_empty());
	}

	#[test]
	fn rejects_unknown_status() {
		assert!(serde_json::from_str::<AlertGroup>(r#"{"status": "pending"}"#).is_err());
		assert!(serde_json::from_str::<AlertGroup>(r#"{"alerts": []}"#).is_err());
	}

	#[test]
	fn template_data_uses_webhook_field_names() {
		let group: AlertGroup = serde_json::from_str(WEBHOOK_PAYLOAD).expect("valid payload");

		let data = serde_json::to_value(group.template_data()).expect("serializable");

		assert_eq!(data["status"], "firing");
		assert_eq!(data["groupLabels"]["alertname"], "HighCPU");
		assert_eq!(data["externalURL"], "http://alertmanager:9093");
		assert_eq!(data["firingAlerts"].as_array().map(Vec::len), Some(2));
		assert_eq!(data["resolvedAlerts"][0]["fingerprint"], "a2");
		assert_eq!(data["alerts"][1]["endsAt"], "2022-05-30T09:30:00Z");
	}
}
