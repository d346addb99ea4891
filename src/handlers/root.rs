//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays a landing
//! page with the available endpoints and the active nickname rules.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Minimal HTML escaping for user-supplied rule text.
fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let built = env!("VERGEN_BUILD_TIMESTAMP");
    let config = &state.config;
    let reducible = config.reducible();

    let mut rule_rows = String::new();
    for (nickname, pattern) in config.rules() {
        writeln!(
            rule_rows,
            "            <tr><td>{}</td><td><code>{}</code></td><td>{}</td></tr>",
            escape(&nickname),
            escape(&pattern),
            if reducible.contains(&nickname) { "yes" } else { "" }
        )
        .ok();
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>nickstat exporter</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
            line-height: 1.6;
        }}
        .container {{
            max-width: 900px;
            margin: 0 auto;
            background: white;
            padding: 40px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }}
        h1 {{ color: #333; border-bottom: 3px solid #007bff; padding-bottom: 15px; }}
        h2 {{ color: #555; margin-top: 35px; }}
        .info {{
            background: #e9ecef;
            padding: 15px;
            border-radius: 4px;
            display: flex;
            justify-content: space-around;
            flex-wrap: wrap;
        }}
        .info-item {{ margin: 10px; }}
        .info-label {{ font-weight: 600; color: #555; display: block; font-size: 0.9em; }}
        .info-value {{ font-size: 1.2em; color: #007bff; }}
        table {{ border-collapse: collapse; width: 100%; }}
        td, th {{ text-align: left; padding: 6px 10px; border-bottom: 1px solid #ddd; }}
        code {{
            background: #e9ecef;
            padding: 2px 6px;
            border-radius: 3px;
            font-family: 'Courier New', monospace;
        }}
    </style>
</head>
<body>
<div class="container">
    <h1>nickstat exporter</h1>
    <p>Per-process CPU, thread and memory usage grouped by command-line nicknames</p>

    <div class="info">
        <div class="info-item">
            <span class="info-label">Host</span>
            <span class="info-value">{hostname}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Version</span>
            <span class="info-value">{version}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Built</span>
            <span class="info-value">{built}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Uptime</span>
            <span class="info-value">{uptime}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Interval</span>
            <span class="info-value">{interval}s</span>
        </div>
        <div class="info-item">
            <span class="info-label">Label</span>
            <span class="info-value">{label}</span>
        </div>
    </div>

    <h2>Endpoints</h2>
    <ul>
        <li><a href="/metrics">/metrics</a> Prometheus gauges of the latest tick</li>
        <li><a href="/health">/health</a> tick statistics (text)</li>
    </ul>

    <h2>Nickname rules</h2>
    <table>
        <thead><tr><th>Nickname</th><th>Pattern</th><th>Reduced</th></tr></thead>
        <tbody>
{rule_rows}        </tbody>
    </table>
</div>
</body>
</html>"#,
        hostname = escape(&state.hostname),
        version = version,
        built = built,
        uptime = state.uptime_string(),
        interval = config.interval_seconds(),
        label = config.label_mode().label_name(),
        rule_rows = rule_rows,
    );

    Html(html)
}
