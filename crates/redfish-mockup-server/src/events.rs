//! Test-event and metric-report fan-out to registered subscribers.
//!
//! Subscribers live in the mockup itself, as members of the
//! `EventService/Subscriptions` collection. Delivery is fire-and-forget:
//! each matching subscriber gets its own detached task and a failed POST is
//! logged, never surfaced to the submitter.

use crate::error::ServerError;
use crate::path::ResourcePath;
use crate::repository::ResourceRepository;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SUBSCRIPTIONS_PATH: &str = "/redfish/v1/EventService/Subscriptions";
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(20);

/// Fields a submitted test event must carry.
const REQUIRED_EVENT_FIELDS: [&str; 8] = [
    "EventType",
    "EventId",
    "EventTimestamp",
    "Severity",
    "Message",
    "MessageId",
    "MessageArgs",
    "OriginOfCondition",
];

/// A subscription usable for delivery: destination plus the event types it
/// asked for.
struct Subscriber {
    destination: String,
    event_types: Vec<String>,
    context: Option<String>,
}

/// Validates submitted events and fans them out to subscribers.
pub struct EventDispatcher {
    repository: Arc<ResourceRepository>,
    client: reqwest::Client,
    short_form: bool,
    /// Envelope ids are process-wide and start at 1.
    event_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new(repository: Arc<ResourceRepository>, short_form: bool) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        Ok(Self {
            repository,
            client,
            short_form,
            event_id: AtomicU64::new(1),
        })
    }

    /// Validate a `SubmitTestEvent` payload and deliver it to every
    /// subscriber registered for its `EventType`. Returns the envelope id.
    pub fn submit_test_event(&self, mut payload: Value) -> Result<u64, ServerError> {
        let subscribers = self.subscribers()?;

        for field in REQUIRED_EVENT_FIELDS {
            if payload.get(field).is_none() {
                return Err(ServerError::MalformedPayload(format!(
                    "event is missing required property {field}"
                )));
            }
        }
        // Subscribers expect a resource reference, not a bare path string.
        let origin = payload["OriginOfCondition"].take();
        payload["OriginOfCondition"] = json!({ "@odata.id": origin });

        let event_type = payload["EventType"].as_str().unwrap_or_default().to_string();
        let id = self.event_id.fetch_add(1, Ordering::SeqCst);
        for sub in subscribers {
            if !sub.event_types.iter().any(|t| t == &event_type) {
                continue;
            }
            let envelope = event_envelope(&payload, sub.context.as_deref(), id);
            self.deliver(sub.destination, envelope);
        }
        Ok(id)
    }

    /// Validate a `SubmitTestMetricReport` payload and deliver the expanded
    /// report to every subscriber, regardless of event type. An accepted
    /// report consumes an envelope id even though the report carries none,
    /// so ids stay sequential across both action types.
    pub fn submit_test_metric_report(&self, payload: Value) -> Result<u64, ServerError> {
        let subscribers = self.subscribers()?;
        let report = metric_report_envelope(&payload)?;
        let id = self.event_id.fetch_add(1, Ordering::SeqCst);
        for sub in subscribers {
            self.deliver(sub.destination, report.clone());
        }
        Ok(id)
    }

    /// Walk the subscriptions collection and resolve each member into a
    /// deliverable subscriber. Missing or tombstoned members and members
    /// without a destination are skipped; a fixture that fails to parse
    /// fails the whole walk.
    fn subscribers(&self) -> Result<Vec<Subscriber>, ServerError> {
        let path = ResourcePath::resolve(SUBSCRIPTIONS_PATH, self.short_form);
        let collection = self
            .repository
            .resolve(&path)?
            .into_document()
            .ok_or_else(|| {
                ServerError::ResourceNotFound(
                    "eventing is not supported by this mockup".to_string(),
                )
            })?;

        let members = collection
            .get("Members")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut subscribers = Vec::new();
        for member in members {
            let Some(id) = member.get("@odata.id").and_then(Value::as_str) else {
                continue;
            };
            let member_path = ResourcePath::resolve(id, self.short_form);
            let Some(doc) = self.repository.resolve(&member_path)?.into_document() else {
                continue;
            };
            let (Some(destination), Some(event_types)) = (
                doc.get("Destination").and_then(Value::as_str),
                doc.get("EventTypes").and_then(Value::as_array),
            ) else {
                continue;
            };
            subscribers.push(Subscriber {
                destination: destination.to_string(),
                event_types: event_types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                context: doc.get("Context").and_then(Value::as_str).map(str::to_string),
            });
        }
        Ok(subscribers)
    }

    /// POST the envelope to one destination on a detached task.
    fn deliver(&self, destination: String, envelope: Value) {
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.post(&destination).json(&envelope).send().await {
                Ok(response) => {
                    debug!(destination, status = %response.status(), "delivered event")
                }
                Err(e) => warn!(destination, error = %e, "event delivery failed"),
            }
        });
    }
}

/// Wrap a validated event payload in the `Event.v1_2_1` envelope sent to a
/// single subscriber.
fn event_envelope(payload: &Value, context: Option<&str>, id: u64) -> Value {
    json!({
        "@odata.type": "#Event.v1_2_1.Event",
        "Id": id.to_string(),
        "Name": "Test Event",
        "Context": context.unwrap_or("Default Context"),
        "Events": [payload]
    })
}

/// Expand a `SubmitTestMetricReport` payload into the full report document.
///
/// `Value` rows are `[member, value, timestamp]` triples with an optional
/// trailing metric property; `EventTimestamp` is carried over only when the
/// submitter supplied one.
fn metric_report_envelope(payload: &Value) -> Result<Value, ServerError> {
    let name = payload
        .get("Name")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ServerError::MalformedPayload("metric report requires a Name string".to_string())
        })?;
    let rows = payload
        .get("Value")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ServerError::MalformedPayload("metric report requires a Value array".to_string())
        })?;

    let mut metric_values = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(row) = row.as_array() else {
            return Err(ServerError::MalformedPayload(
                "metric report rows must be arrays".to_string(),
            ));
        };
        if row.len() != 3 && row.len() != 4 {
            return Err(ServerError::MalformedPayload(
                "metric report rows must have three or four entries".to_string(),
            ));
        }
        let mut value = json!({
            "MemberID": row[0],
            "MetricValue": row[1],
            "TimeStamp": row[2],
        });
        if let Some(property) = row.get(3) {
            value["MetricProperty"] = property.clone();
        }
        metric_values.push(value);
    }

    let mut report = json!({
        "@Redfish.Copyright": "Copyright 2014-2016 Distributed Management Task Force, Inc. (DMTF). All rights reserved.",
        "@odata.context": "/redfish/v1/$metadata#MetricReport.MetricReport",
        "@odata.type": "#MetricReport.v1_0_0.MetricReport",
        "@odata.id": format!("/redfish/v1/TelemetryService/MetricReports/{name}"),
        "Id": name,
        "Name": name,
        "MetricReportDefinition": {
            "@odata.id": format!("/redfish/v1/TelemetryService/MetricReportDefinitions/{name}")
        },
        "MetricValues": metric_values
    });
    if let Some(timestamp) = payload.get("EventTimestamp") {
        report["EventTimestamp"] = timestamp.clone();
    }
    Ok(report)
}
