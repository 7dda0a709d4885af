//! Status page for the ingest service
//!
//! A single server-rendered page showing build info and a live event
//! log fed by the SSE stream. The analyst-facing dashboard lives in
//! cti-web; this page exists for operating the ingest service itself.

use axum::{
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use crate::AppState;

const APP_JS: &str = r#"'use strict';

const log = document.getElementById('event-log');
const status = document.getElementById('sse-status');

function appendEvent(name, data) {
    const row = document.createElement('div');
    row.className = 'event-row';
    const ts = new Date().toLocaleTimeString();
    let detail = '';
    try {
        const parsed = JSON.parse(data);
        detail = parsed.detail || parsed.title || parsed.source_name || parsed.error_message || '';
    } catch (e) {
        detail = '';
    }
    row.textContent = ts + '  ' + name + (detail ? '  -  ' + detail : '');
    log.prepend(row);
    while (log.childElementCount > 200) {
        log.removeChild(log.lastChild);
    }
}

const EVENT_NAMES = [
    'ScrapeSessionStarted', 'SourcePolled', 'ArticleStored',
    'ScrapeSessionCompleted', 'ScrapeSessionFailed',
    'WorkflowSessionStarted', 'WorkflowStageStarted', 'WorkflowStageCompleted',
    'WorkflowSessionCompleted', 'WorkflowSessionDiscarded',
    'WorkflowSessionFailed', 'WorkflowSessionCancelled', 'QueueEntryAdded',
];

const source = new EventSource('/events');
source.onopen = () => { status.textContent = 'connected'; status.className = 'ok'; };
source.onerror = () => { status.textContent = 'disconnected'; status.className = 'err'; };
for (const name of EVENT_NAMES) {
    source.addEventListener(name, (e) => appendEvent(name, e.data));
}

document.getElementById('scrape-now').addEventListener('click', async () => {
    const resp = await fetch('/api/scrape/start', { method: 'POST' });
    const body = await resp.json();
    if (!resp.ok) {
        appendEvent('Error', JSON.stringify({ detail: body.error ? body.error.message : 'scrape failed' }));
    }
});
"#;

/// GET /
pub async fn root_page() -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = env!("GIT_HASH");
    let build_timestamp = env!("BUILD_TIMESTAMP");
    let build_profile = env!("BUILD_PROFILE");

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>CTI Scraper - Ingest</title>
<style>
body {{ font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; background-color: #1a1a1a; color: #e0e0e0; margin: 0; }}
header {{ background-color: #2a2a2a; border-bottom: 1px solid #3a3a3a; padding: 16px 24px; display: flex; justify-content: space-between; align-items: baseline; }}
h1 {{ font-size: 22px; color: #4a9eff; margin: 0; }}
.build-info {{ color: #888; font-size: 13px; font-family: 'Courier New', monospace; text-align: right; }}
main {{ padding: 24px; }}
button {{ background-color: #4a9eff; color: #fff; border: none; padding: 8px 16px; border-radius: 4px; cursor: pointer; font-size: 14px; }}
button:hover {{ background-color: #3a8eef; }}
#sse-status {{ margin-left: 12px; font-size: 13px; }}
#sse-status.ok {{ color: #5fd068; }}
#sse-status.err {{ color: #e05f5f; }}
#event-log {{ margin-top: 16px; background-color: #222; border: 1px solid #3a3a3a; border-radius: 4px; padding: 12px; font-family: 'Courier New', monospace; font-size: 13px; max-height: 480px; overflow-y: auto; }}
.event-row {{ padding: 2px 0; border-bottom: 1px solid #2a2a2a; white-space: nowrap; overflow: hidden; text-overflow: ellipsis; }}
</style>
</head>
<body>
<header>
  <h1>CTI Scraper &middot; Ingest</h1>
  <div class="build-info">
    <div>v{version} [{git_hash}]</div>
    <div>{build_timestamp} ({build_profile})</div>
  </div>
</header>
<main>
  <button id="scrape-now">Scrape due sources now</button>
  <span id="sse-status">connecting&hellip;</span>
  <div id="event-log"></div>
</main>
<script src="/static/app.js"></script>
</body>
</html>
"#
    );

    Html(html)
}

/// GET /static/app.js
pub async fn serve_app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], APP_JS)
}

/// Build UI routes
pub fn ui_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root_page))
        .route("/static/app.js", get(serve_app_js))
}
