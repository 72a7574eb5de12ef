use std::{collections::HashMap, fmt::Write as _};

use super::core::{MetricsState, METRICS_STATE};

pub(crate) fn metrics_state() -> &'static MetricsState {
    METRICS_STATE.get_or_init(MetricsState::default)
}

pub(crate) fn record_auth_failure(reason: &'static str) {
    if let Ok(mut counters) = metrics_state().auth_failures.lock() {
        *counters.entry(reason).or_insert(0) += 1;
    }
}

pub(crate) fn record_ws_disconnect(reason: &'static str) {
    if let Ok(mut counters) = metrics_state().ws_disconnects.lock() {
        *counters.entry(reason).or_insert(0) += 1;
    }
}

pub(crate) fn record_session_eviction() {
    if let Ok(mut counter) = metrics_state().session_evictions.lock() {
        *counter += 1;
    }
}

pub(crate) fn record_gateway_event_emitted(scope: &'static str, event_type: &'static str) {
    if let Ok(mut counters) = metrics_state().gateway_events_emitted.lock() {
        *counters.entry((scope, event_type)).or_insert(0) += 1;
    }
}

pub(crate) fn record_gateway_event_dropped(
    scope: &'static str,
    event_type: &'static str,
    reason: &'static str,
) {
    if let Ok(mut counters) = metrics_state().gateway_events_dropped.lock() {
        *counters.entry((scope, event_type, reason)).or_insert(0) += 1;
    }
}

pub(crate) fn record_gateway_event_parse_rejected(scope: &'static str, reason: &'static str) {
    if let Ok(mut counters) = metrics_state().gateway_events_parse_rejected.lock() {
        *counters.entry((scope, reason)).or_insert(0) += 1;
    }
}

pub(crate) fn record_gateway_event_unknown_received(event_type: &str) {
    if let Ok(mut counters) = metrics_state().gateway_events_unknown_received.lock() {
        *counters.entry(event_type.to_owned()).or_insert(0) += 1;
    }
}

pub(crate) fn render_metrics() -> String {
    let auth_failures = metrics_state()
        .auth_failures
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let ws_disconnects = metrics_state()
        .ws_disconnects
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let session_evictions = metrics_state()
        .session_evictions
        .lock()
        .map_or_else(|_| 0, |guard| *guard);
    let gateway_events_emitted = metrics_state()
        .gateway_events_emitted
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let gateway_events_dropped = metrics_state()
        .gateway_events_dropped
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let gateway_events_parse_rejected = metrics_state()
        .gateway_events_parse_rejected
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let gateway_events_unknown_received = metrics_state()
        .gateway_events_unknown_received
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());

    let mut output = String::new();
    output.push_str("# HELP roster_auth_failures_total Count of handshake rejections by reason\n");
    output.push_str("# TYPE roster_auth_failures_total counter\n");
    let mut auth_entries: Vec<_> = auth_failures.into_iter().collect();
    auth_entries.sort_by_key(|(reason, _)| *reason);
    for (reason, value) in auth_entries {
        let _ = writeln!(
            output,
            "roster_auth_failures_total{{reason=\"{reason}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP roster_ws_disconnects_total Count of websocket disconnect events by reason\n",
    );
    output.push_str("# TYPE roster_ws_disconnects_total counter\n");
    let mut ws_entries: Vec<_> = ws_disconnects.into_iter().collect();
    ws_entries.sort_by_key(|(reason, _)| *reason);
    for (reason, value) in ws_entries {
        let _ = writeln!(
            output,
            "roster_ws_disconnects_total{{reason=\"{reason}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP roster_session_evictions_total Count of sessions replaced by a newer login\n",
    );
    output.push_str("# TYPE roster_session_evictions_total counter\n");
    let _ = writeln!(output, "roster_session_evictions_total {session_evictions}");

    output.push_str(
        "# HELP roster_gateway_events_emitted_total Count of emitted gateway events by scope and type\n",
    );
    output.push_str("# TYPE roster_gateway_events_emitted_total counter\n");
    let mut emitted_entries: Vec<_> = gateway_events_emitted.into_iter().collect();
    emitted_entries.sort_by(|((a_scope, a_event), _), ((b_scope, b_event), _)| {
        a_scope.cmp(b_scope).then(a_event.cmp(b_event))
    });
    for ((scope, event_type), value) in emitted_entries {
        let _ = writeln!(
            output,
            "roster_gateway_events_emitted_total{{scope=\"{scope}\",event_type=\"{event_type}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP roster_gateway_events_dropped_total Count of dropped gateway events by scope, type, and reason\n",
    );
    output.push_str("# TYPE roster_gateway_events_dropped_total counter\n");
    let mut dropped_entries: Vec<_> = gateway_events_dropped.into_iter().collect();
    dropped_entries.sort_by(
        |((a_scope, a_event, a_reason), _), ((b_scope, b_event, b_reason), _)| {
            a_scope
                .cmp(b_scope)
                .then(a_event.cmp(b_event))
                .then(a_reason.cmp(b_reason))
        },
    );
    for ((scope, event_type, reason), value) in dropped_entries {
        let _ = writeln!(
            output,
            "roster_gateway_events_dropped_total{{scope=\"{scope}\",event_type=\"{event_type}\",reason=\"{reason}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP roster_gateway_events_parse_rejected_total Count of inbound payloads rejected before dispatch\n",
    );
    output.push_str("# TYPE roster_gateway_events_parse_rejected_total counter\n");
    let mut rejected_entries: Vec<_> = gateway_events_parse_rejected.into_iter().collect();
    rejected_entries.sort_by(|((a_scope, a_reason), _), ((b_scope, b_reason), _)| {
        a_scope.cmp(b_scope).then(a_reason.cmp(b_reason))
    });
    for ((scope, reason), value) in rejected_entries {
        let _ = writeln!(
            output,
            "roster_gateway_events_parse_rejected_total{{scope=\"{scope}\",reason=\"{reason}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP roster_gateway_events_unknown_received_total Count of inbound events with unrecognized types\n",
    );
    output.push_str("# TYPE roster_gateway_events_unknown_received_total counter\n");
    let mut unknown_entries: Vec<_> = gateway_events_unknown_received.into_iter().collect();
    unknown_entries.sort();
    for (event_type, value) in unknown_entries {
        let _ = writeln!(
            output,
            "roster_gateway_events_unknown_received_total{{event_type=\"{event_type}\"}} {value}"
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::{record_auth_failure, record_session_eviction, render_metrics};

    #[test]
    fn render_includes_recorded_counters() {
        record_auth_failure("unknown_user");
        record_session_eviction();

        let output = render_metrics();
        assert!(output.contains("roster_auth_failures_total{reason=\"unknown_user\"}"));
        assert!(output.contains("roster_session_evictions_total"));
    }
}
