//! Per-pixel event aggregation
//!
//! Turns one pixel's event history into the stats summary served by the API:
//! new vs. returning visitor classification keyed by IP hash, frequency tables
//! for the categorical dimensions, and the flattened parameter-value rows.
//!
//! Events must be supplied in ascending timestamp order. The returning flag is
//! computed from a running count, so the first event of a repeat visitor is
//! still reported as new.
//!
//! All counters live in an [`AnalyticsAggregator`] built for a single query;
//! nothing is shared between calls.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::analytics::models::{
    CountMap, EventAggregate, ParameterRow, PublicEvent, StatsSummary,
};
use crate::models::PixelEvent;

/// Aggregate a pixel's full event history.
pub fn aggregate(events: &[PixelEvent]) -> EventAggregate {
    let mut aggregator = AnalyticsAggregator::new();
    for event in events {
        aggregator.record(event);
    }
    aggregator.finish()
}

/// Request-scoped accumulator for one pixel's events
#[derive(Debug, Default)]
pub struct AnalyticsAggregator {
    ip_counts: HashMap<String, u64>,
    country_counts: CountMap,
    device_type_counts: CountMap,
    os_counts: CountMap,
    browser_counts: CountMap,
    param_counts: BTreeMap<String, CountMap>,
    events: Vec<PublicEvent>,
}

impl AnalyticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the counters and return whether it came from a
    /// returning visitor.
    pub fn record(&mut self, event: &PixelEvent) -> bool {
        let seen = self.ip_counts.entry(event.ip_hash.clone()).or_insert(0);
        *seen += 1;
        let is_returning = *seen > 1;

        // Region is projected on events but not tallied
        increment_present(&mut self.country_counts, event.country.as_deref());
        increment_present(
            &mut self.device_type_counts,
            event.device_type.as_ref().map(|d| d.as_str()),
        );
        increment_present(&mut self.os_counts, event.os.as_deref());
        increment_present(&mut self.browser_counts, event.browser.as_deref());

        for (name, value) in &event.params {
            *self
                .param_counts
                .entry(name.clone())
                .or_default()
                .entry(stringify_param(value))
                .or_insert(0) += 1;
        }

        self.events.push(PublicEvent {
            timestamp: event.timestamp,
            is_returning,
            country: event.country.clone(),
            region: event.region.clone(),
            browser: event.browser.clone(),
            os: event.os.clone(),
            device_type: event.device_type,
            params: event.params.clone(),
            notes: event.notes.clone(),
        });

        is_returning
    }

    pub fn finish(self) -> EventAggregate {
        let total_events = self.events.len() as u64;
        let unique_users = self.ip_counts.len() as u64;
        let returning_users = self.ip_counts.values().filter(|&&c| c > 1).count() as u64;

        let parameter_rows = flatten_param_counts(&self.param_counts);

        EventAggregate {
            events: self.events,
            summary: StatsSummary {
                total_events,
                unique_users,
                new_users: unique_users - returning_users,
                returning_users,
                events_per_user: events_per_user(total_events, unique_users),
                country_counts: self.country_counts,
                device_type_counts: self.device_type_counts,
                os_counts: self.os_counts,
                browser_counts: self.browser_counts,
                param_counts: self.param_counts,
                parameter_rows,
            },
        }
    }
}

fn increment_present(counts: &mut CountMap, key: Option<&str>) {
    if let Some(key) = key.filter(|k| !k.is_empty()) {
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
}

/// Average events per distinct visitor, rounded to one decimal place.
pub fn events_per_user(total_events: u64, unique_users: u64) -> f64 {
    if unique_users == 0 {
        return 0.0;
    }
    let ratio = total_events as f64 / unique_users as f64;
    (ratio * 10.0).round() / 10.0
}

/// String form of a loosely typed parameter value, used as its count key.
pub fn stringify_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify_param)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Flatten nested parameter counts into rows sorted by parameter name
/// ascending, then by count descending.
///
/// Rows with equal name and count keep the map's ascending value order.
pub fn flatten_param_counts(param_counts: &BTreeMap<String, CountMap>) -> Vec<ParameterRow> {
    let mut rows: Vec<ParameterRow> = param_counts
        .iter()
        .flat_map(|(parameter, values)| {
            values.iter().map(move |(value, &count)| ParameterRow {
                parameter: parameter.clone(),
                value: value.clone(),
                count,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.parameter
            .cmp(&b.parameter)
            .then_with(|| b.count.cmp(&a.count))
    });

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceType, EventParams};
    use serde_json::json;

    fn event(timestamp: i64, ip_hash: &str) -> PixelEvent {
        PixelEvent {
            id: timestamp,
            pixel_id: "pixel".to_string(),
            timestamp,
            ip_hash: ip_hash.to_string(),
            country: None,
            region: None,
            browser: None,
            os: None,
            device_type: None,
            params: EventParams::new(),
            notes: None,
        }
    }

    fn with_params(mut event: PixelEvent, params: Value) -> PixelEvent {
        if let Value::Object(map) = params {
            event.params = map;
        }
        event
    }

    #[test]
    fn test_empty_history() {
        let result = aggregate(&[]);
        let summary = &result.summary;

        assert!(result.events.is_empty());
        assert_eq!(summary.total_events, 0);
        assert_eq!(summary.unique_users, 0);
        assert_eq!(summary.new_users, 0);
        assert_eq!(summary.returning_users, 0);
        assert_eq!(summary.events_per_user, 0.0);
        assert!(summary.country_counts.is_empty());
        assert!(summary.device_type_counts.is_empty());
        assert!(summary.os_counts.is_empty());
        assert!(summary.browser_counts.is_empty());
        assert!(summary.param_counts.is_empty());
        assert!(summary.parameter_rows.is_empty());
    }

    #[test]
    fn test_two_visits_from_one_ip_and_one_from_another() {
        let events = vec![event(1, "a"), event(2, "a"), event(3, "b")];
        let result = aggregate(&events);

        let flags: Vec<bool> = result.events.iter().map(|e| e.is_returning).collect();
        assert_eq!(flags, vec![false, true, false]);

        assert_eq!(result.summary.total_events, 3);
        assert_eq!(result.summary.unique_users, 2);
        assert_eq!(result.summary.returning_users, 1);
        assert_eq!(result.summary.new_users, 1);
        assert_eq!(result.summary.events_per_user, 1.5);
    }

    #[test]
    fn test_returning_flag_is_running_not_retroactive() {
        let events = vec![
            event(1, "x"),
            event(2, "y"),
            event(3, "x"),
            event(4, "x"),
            event(5, "z"),
        ];
        let result = aggregate(&events);

        let flags: Vec<bool> = result.events.iter().map(|e| e.is_returning).collect();
        assert_eq!(flags, vec![false, false, true, true, false]);
    }

    #[test]
    fn test_user_counts_always_add_up() {
        let hashes = ["a", "b", "a", "c", "c", "c", "d", "e", "a"];
        for len in 0..=hashes.len() {
            let events: Vec<PixelEvent> = hashes[..len]
                .iter()
                .enumerate()
                .map(|(i, h)| event(i as i64, h))
                .collect();
            let summary = aggregate(&events).summary;
            assert_eq!(summary.new_users + summary.returning_users, summary.unique_users);
        }
    }

    #[test]
    fn test_events_per_user_rounding() {
        assert_eq!(events_per_user(0, 0), 0.0);
        assert_eq!(events_per_user(5, 0), 0.0);
        assert_eq!(events_per_user(7, 3), 2.3);
        assert_eq!(events_per_user(5, 3), 1.7);
        assert_eq!(events_per_user(4, 4), 1.0);
        assert_eq!(events_per_user(10, 4), 2.5);
    }

    #[test]
    fn test_dimension_counts_skip_absent_values() {
        let mut first = event(1, "a");
        first.country = Some("US".to_string());
        first.region = Some("CA".to_string());
        first.browser = Some("Firefox".to_string());
        first.os = Some("Linux".to_string());
        first.device_type = Some(DeviceType::Desktop);

        let mut second = event(2, "b");
        second.country = Some("US".to_string());
        second.browser = Some(String::new());
        second.device_type = Some(DeviceType::Mobile);

        let mut third = event(3, "c");
        third.country = Some("Unknown".to_string());

        let result = aggregate(&[first, second, third]);
        let summary = &result.summary;

        assert_eq!(summary.country_counts.get("US"), Some(&2));
        assert_eq!(summary.country_counts.get("Unknown"), Some(&1));
        assert_eq!(summary.browser_counts.len(), 1);
        assert_eq!(summary.browser_counts.get("Firefox"), Some(&1));
        assert_eq!(summary.os_counts.get("Linux"), Some(&1));
        assert_eq!(summary.os_counts.len(), 1);
        assert_eq!(summary.device_type_counts.get("Desktop"), Some(&1));
        assert_eq!(summary.device_type_counts.get("Mobile"), Some(&1));

        // Region is exposed per event but has no frequency table
        assert_eq!(result.events[0].region.as_deref(), Some("CA"));
    }

    #[test]
    fn test_param_values_are_stringified_before_counting() {
        let events = vec![
            with_params(event(1, "a"), json!({"n": "1", "flag": true})),
            with_params(event(2, "b"), json!({"n": 1, "flag": "true"})),
            with_params(event(3, "c"), json!({"n": ["1", "2"], "flag": null})),
        ];
        let summary = aggregate(&events).summary;

        assert_eq!(summary.param_counts["n"].get("1"), Some(&2));
        assert_eq!(summary.param_counts["n"].get("1,2"), Some(&1));
        assert_eq!(summary.param_counts["flag"].get("true"), Some(&2));
        assert_eq!(summary.param_counts["flag"].get("null"), Some(&1));
    }

    #[test]
    fn test_stringify_param_shapes() {
        assert_eq!(stringify_param(&json!("abc")), "abc");
        assert_eq!(stringify_param(&json!(2.5)), "2.5");
        assert_eq!(stringify_param(&json!(false)), "false");
        assert_eq!(stringify_param(&json!([1, "x", [2, 3]])), "1,x,2,3");
        assert_eq!(stringify_param(&json!({"k": 1})), r#"{"k":1}"#);
    }

    #[test]
    fn test_parameter_rows_sorted_by_name_then_count_desc() {
        let events = vec![
            with_params(event(1, "a"), json!({"utm_source": "mail", "campaign": "spring"})),
            with_params(event(2, "b"), json!({"utm_source": "web", "campaign": "fall"})),
            with_params(event(3, "c"), json!({"utm_source": "web", "campaign": "fall"})),
            with_params(event(4, "d"), json!({"utm_source": "ads", "campaign": "winter"})),
            with_params(event(5, "e"), json!({"utm_source": "web"})),
            with_params(event(6, "f"), json!({"utm_source": "ads", "b": "x"})),
        ];
        let rows = aggregate(&events).summary.parameter_rows;

        let flat: Vec<(&str, &str, u64)> = rows
            .iter()
            .map(|r| (r.parameter.as_str(), r.value.as_str(), r.count))
            .collect();

        assert_eq!(
            flat,
            vec![
                ("b", "x", 1),
                ("campaign", "fall", 2),
                // tie on count: ascending value order
                ("campaign", "spring", 1),
                ("campaign", "winter", 1),
                ("utm_source", "web", 3),
                ("utm_source", "ads", 2),
                ("utm_source", "mail", 1),
            ]
        );
    }

    #[test]
    fn test_parameter_rows_reaggregate_to_param_counts() {
        let events = vec![
            with_params(event(1, "a"), json!({"a": "1", "b": "2", "c": "3"})),
            with_params(event(2, "a"), json!({"a": "1", "b": "9"})),
            with_params(event(3, "b"), json!({"a": 7, "d": ["x", "y"]})),
        ];
        let summary = aggregate(&events).summary;

        let mut rebuilt: BTreeMap<String, CountMap> = BTreeMap::new();
        for row in &summary.parameter_rows {
            *rebuilt
                .entry(row.parameter.clone())
                .or_default()
                .entry(row.value.clone())
                .or_insert(0) += row.count;
        }

        assert_eq!(rebuilt, summary.param_counts);
    }

    #[test]
    fn test_public_event_projection_copies_fields() {
        let mut stored = with_params(event(42, "a"), json!({"ref": "home"}));
        stored.country = Some("DE".to_string());
        stored.region = Some("BE".to_string());
        stored.browser = Some("Chrome".to_string());
        stored.os = Some("Windows".to_string());
        stored.device_type = Some(DeviceType::Tablet);
        stored.notes = Some("Only first 1 of 2 params saved".to_string());

        let result = aggregate(std::slice::from_ref(&stored));
        let public = &result.events[0];

        assert_eq!(public.timestamp, 42);
        assert!(!public.is_returning);
        assert_eq!(public.country, stored.country);
        assert_eq!(public.region, stored.region);
        assert_eq!(public.browser, stored.browser);
        assert_eq!(public.os, stored.os);
        assert_eq!(public.device_type, Some(DeviceType::Tablet));
        assert_eq!(public.params, stored.params);
        assert_eq!(public.notes, stored.notes);
    }

    #[test]
    fn test_public_event_serializes_camel_case() {
        let result = aggregate(&[event(1, "a")]);
        let value = serde_json::to_value(&result.events[0]).unwrap();

        assert_eq!(value["isReturning"], json!(false));
        assert_eq!(value["deviceType"], Value::Null);
        assert_eq!(value["params"], json!({}));
        assert!(value.get("ip_hash").is_none());
    }
}
