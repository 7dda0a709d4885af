//! Server-rendered dashboard shell and static assets
//!
//! One HTML page; app.js drives the tabs against the JSON API. The
//! shared-secret (when auth is enabled) is entered once and kept in
//! localStorage, sent as the X-CTI-Auth header on every request.

use axum::{
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use crate::AppState;

const CTI_CSS: &str = r#"* { box-sizing: border-box; }
body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; background-color: #1a1a1a; color: #e0e0e0; margin: 0; line-height: 1.5; }
header { background-color: #2a2a2a; border-bottom: 1px solid #3a3a3a; padding: 14px 24px; display: flex; justify-content: space-between; align-items: baseline; }
h1 { font-size: 20px; color: #4a9eff; margin: 0; }
.build-info { color: #888; font-size: 12px; font-family: 'Courier New', monospace; text-align: right; }
nav { background-color: #222; border-bottom: 1px solid #3a3a3a; padding: 0 24px; }
nav button { background: none; border: none; color: #aaa; padding: 10px 14px; cursor: pointer; font-size: 14px; border-bottom: 2px solid transparent; }
nav button.active { color: #4a9eff; border-bottom-color: #4a9eff; }
main { padding: 20px 24px; }
table { width: 100%; border-collapse: collapse; font-size: 14px; }
th, td { text-align: left; padding: 6px 10px; border-bottom: 1px solid #2e2e2e; }
th { color: #9ab; font-weight: 600; }
tr:hover td { background-color: #222; }
.pill { display: inline-block; padding: 1px 8px; border-radius: 10px; font-size: 12px; background-color: #333; }
.pill.new { background-color: #2d4a6b; color: #9cf; }
.pill.processed { background-color: #2c4a2e; color: #9e9; }
.pill.junk { background-color: #4a2c2c; color: #e99; }
.pill.pending { background-color: #4a442c; color: #ed9; }
.stat-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(180px, 1fr)); gap: 12px; margin-bottom: 20px; }
.stat-card { background-color: #222; border: 1px solid #3a3a3a; border-radius: 6px; padding: 14px; }
.stat-card .label { color: #888; font-size: 13px; }
.stat-card .value { font-size: 26px; color: #e0e0e0; }
.toolbar { margin-bottom: 14px; display: flex; gap: 10px; align-items: center; }
input[type=text], input[type=password] { background-color: #222; border: 1px solid #3a3a3a; color: #e0e0e0; border-radius: 4px; padding: 6px 10px; font-size: 14px; }
button.action { background-color: #4a9eff; color: #fff; border: none; padding: 6px 14px; border-radius: 4px; cursor: pointer; font-size: 13px; }
button.action:hover { background-color: #3a8eef; }
button.action.secondary { background-color: #3a3a3a; }
#error-bar { display: none; background-color: #4a2c2c; color: #e99; padding: 8px 24px; font-size: 13px; }
pre { background-color: #222; border: 1px solid #3a3a3a; border-radius: 4px; padding: 12px; overflow-x: auto; font-size: 13px; }
"#;

const APP_JS: &str = r#"'use strict';

const errorBar = document.getElementById('error-bar');

function authHeaders() {
    const secret = localStorage.getItem('cti-auth') || '';
    return secret ? { 'X-CTI-Auth': secret } : {};
}

async function api(path, options = {}) {
    const resp = await fetch(path, {
        ...options,
        headers: {
            'Content-Type': 'application/json',
            ...authHeaders(),
            ...(options.headers || {}),
        },
    });
    if (!resp.ok) {
        let message = resp.status + ' ' + resp.statusText;
        try {
            const body = await resp.json();
            if (body.error && body.error.message) message = body.error.message;
        } catch (e) { /* non-JSON error body */ }
        throw new Error(message);
    }
    return resp.json();
}

function showError(err) {
    errorBar.textContent = String(err.message || err);
    errorBar.style.display = 'block';
    setTimeout(() => { errorBar.style.display = 'none'; }, 6000);
}

function el(tag, text, className) {
    const node = document.createElement(tag);
    if (text !== undefined && text !== null) node.textContent = text;
    if (className) node.className = className;
    return node;
}

function pill(value) {
    const span = el('span', value, 'pill ' + value);
    return span;
}

const main = document.getElementById('content');

// ---- Stats tab ----

async function renderStats() {
    const stats = await api('/api/stats');
    main.replaceChildren();

    const grid = el('div', null, 'stat-grid');
    const cards = [
        ['New articles', stats.articles.new || 0],
        ['In review', stats.articles.in_review || 0],
        ['Processed', stats.articles.processed || 0],
        ['Junk', stats.articles.junk || 0],
        ['Queue pending', stats.queue.pending || 0],
        ['Queue claimed', stats.queue.claimed || 0],
        ['Draft rules', stats.rules.draft || 0],
        ['Approved rules', stats.rules.approved || 0],
        ['Sources active', stats.sources.active + ' / ' + stats.sources.total],
        ['Sources failing', stats.sources.failing],
    ];
    for (const [label, value] of cards) {
        const card = el('div', null, 'stat-card');
        card.appendChild(el('div', label, 'label'));
        card.appendChild(el('div', String(value), 'value'));
        grid.appendChild(card);
    }
    main.appendChild(grid);
}

// ---- Articles tab ----

async function renderArticles() {
    main.replaceChildren();

    const toolbar = el('div', null, 'toolbar');
    const search = el('input');
    search.type = 'text';
    search.placeholder = 'Search articles…';
    const go = el('button', 'Search', 'action');
    toolbar.appendChild(search);
    toolbar.appendChild(go);
    main.appendChild(toolbar);

    const table = el('table');
    table.appendChild(headerRow(['Title', 'Status', 'Scraped', 'Actions']));
    main.appendChild(table);

    async function load() {
        const q = search.value.trim();
        const data = await api('/api/articles' + (q ? '?q=' + encodeURIComponent(q) : ''));
        while (table.rows.length > 1) table.deleteRow(1);
        for (const article of data.articles) {
            const row = table.insertRow();
            const titleCell = row.insertCell();
            const link = el('a', article.title);
            link.href = article.url;
            link.target = '_blank';
            link.style.color = '#9cf';
            titleCell.appendChild(link);
            row.insertCell().appendChild(pill(article.triage_status));
            row.insertCell().textContent = article.scraped_at.slice(0, 19);
            const actions = row.insertCell();
            const archive = el('button', 'Archive', 'action secondary');
            archive.onclick = () => api('/api/articles/' + article.article_id + '/triage', {
                method: 'PUT',
                body: JSON.stringify({ status: 'archived' }),
            }).then(load).catch(showError);
            actions.appendChild(archive);
        }
    }

    go.onclick = () => load().catch(showError);
    search.addEventListener('keydown', (e) => { if (e.key === 'Enter') load().catch(showError); });
    await load();
}

// ---- Queue tab ----

async function renderQueue() {
    main.replaceChildren();
    const table = el('table');
    table.appendChild(headerRow(['Priority', 'Article', 'Rule', 'State', 'Claimed by', 'Actions']));
    main.appendChild(table);

    async function load() {
        const data = await api('/api/queue');
        while (table.rows.length > 1) table.deleteRow(1);
        for (const entry of data.entries) {
            const row = table.insertRow();
            row.insertCell().textContent = entry.priority;
            row.insertCell().textContent = entry.article_id.slice(0, 8);
            row.insertCell().textContent = entry.rule_id ? entry.rule_id.slice(0, 8) : '—';
            row.insertCell().appendChild(pill(entry.state));
            row.insertCell().textContent = entry.claimed_by || '';
            const actions = row.insertCell();
            if (entry.state === 'pending') {
                const claim = el('button', 'Claim', 'action');
                claim.onclick = () => {
                    const analyst = localStorage.getItem('cti-analyst') || prompt('Analyst name:');
                    if (!analyst) return;
                    localStorage.setItem('cti-analyst', analyst);
                    api('/api/queue/' + entry.entry_id + '/claim', {
                        method: 'POST',
                        body: JSON.stringify({ analyst }),
                    }).then(load).catch(showError);
                };
                actions.appendChild(claim);
            } else if (entry.state === 'claimed') {
                const resolve = el('button', 'Resolve', 'action secondary');
                resolve.onclick = () => api('/api/queue/' + entry.entry_id + '/resolve', { method: 'POST' })
                    .then(load).catch(showError);
                actions.appendChild(resolve);
            }
        }
    }

    await load();
}

// ---- Rules tab ----

async function renderRules() {
    main.replaceChildren();
    const table = el('table');
    table.appendChild(headerRow(['Title', 'Status', 'Similarity', 'Created', 'Actions']));
    main.appendChild(table);
    const viewer = el('pre', 'Select a rule to view its YAML.');
    main.appendChild(viewer);

    async function load() {
        const data = await api('/api/rules');
        while (table.rows.length > 1) table.deleteRow(1);
        for (const rule of data.rules) {
            const row = table.insertRow();
            const titleCell = row.insertCell();
            const link = el('a', rule.title);
            link.href = '#';
            link.style.color = '#9cf';
            link.onclick = (e) => {
                e.preventDefault();
                api('/api/rules/' + rule.rule_id).then((full) => { viewer.textContent = full.yaml; }).catch(showError);
            };
            titleCell.appendChild(link);
            row.insertCell().appendChild(pill(rule.status));
            row.insertCell().textContent = rule.similarity != null ? rule.similarity.toFixed(2) : '';
            row.insertCell().textContent = rule.created_at.slice(0, 19);
            const actions = row.insertCell();
            for (const [label, status] of [['Approve', 'approved'], ['Reject', 'rejected']]) {
                const btn = el('button', label, 'action' + (status === 'rejected' ? ' secondary' : ''));
                btn.onclick = () => api('/api/rules/' + rule.rule_id + '/status', {
                    method: 'PUT',
                    body: JSON.stringify({ status }),
                }).then(load).catch(showError);
                actions.appendChild(btn);
            }
        }
    }

    await load();
}

// ---- Sources tab ----

async function renderSources() {
    main.replaceChildren();

    const toolbar = el('div', null, 'toolbar');
    const name = el('input');
    name.type = 'text';
    name.placeholder = 'Name';
    const feed = el('input');
    feed.type = 'text';
    feed.placeholder = 'Feed URL';
    const add = el('button', 'Add source', 'action');
    toolbar.appendChild(name);
    toolbar.appendChild(feed);
    toolbar.appendChild(add);
    main.appendChild(toolbar);

    const table = el('table');
    table.appendChild(headerRow(['Name', 'Feed', 'Active', 'Failures', 'Last polled', 'Actions']));
    main.appendChild(table);

    async function load() {
        const sources = await api('/api/sources');
        while (table.rows.length > 1) table.deleteRow(1);
        for (const source of sources) {
            const row = table.insertRow();
            row.insertCell().textContent = source.name;
            row.insertCell().textContent = source.feed_url;
            row.insertCell().textContent = source.active ? 'yes' : 'no';
            row.insertCell().textContent = source.consecutive_failures;
            row.insertCell().textContent = source.last_polled_at ? source.last_polled_at.slice(0, 19) : 'never';
            const actions = row.insertCell();
            const toggle = el('button', source.active ? 'Disable' : 'Enable', 'action secondary');
            toggle.onclick = () => api('/api/sources/' + source.source_id + '/toggle', { method: 'POST' })
                .then(load).catch(showError);
            actions.appendChild(toggle);
        }
    }

    add.onclick = () => api('/api/sources', {
        method: 'POST',
        body: JSON.stringify({ name: name.value, feed_url: feed.value }),
    }).then(() => { name.value = ''; feed.value = ''; return load(); }).catch(showError);

    await load();
}

function headerRow(labels) {
    const row = el('tr');
    for (const label of labels) row.appendChild(el('th', label));
    return row;
}

// ---- Tabs and auth ----

const TABS = {
    stats: renderStats,
    articles: renderArticles,
    queue: renderQueue,
    rules: renderRules,
    sources: renderSources,
};

for (const button of document.querySelectorAll('nav button[data-tab]')) {
    button.addEventListener('click', () => {
        document.querySelectorAll('nav button').forEach((b) => b.classList.remove('active'));
        button.classList.add('active');
        TABS[button.dataset.tab]().catch(showError);
    });
}

document.getElementById('auth-secret').addEventListener('change', (e) => {
    localStorage.setItem('cti-auth', e.target.value.trim());
});
document.getElementById('auth-secret').value = localStorage.getItem('cti-auth') || '';

renderStats().catch(showError);
"#;

/// GET /
pub async fn serve_index() -> impl IntoResponse {
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
<title>CTI Scraper</title>
<link rel="stylesheet" href="/static/cti.css">
</head>
<body>
<header>
  <h1>CTI Scraper</h1>
  <div>
    <input type="password" id="auth-secret" placeholder="API secret" title="Shared secret (X-CTI-Auth)">
  </div>
  <div class="build-info">
    <div>v{version} [{git_hash}]</div>
    <div>{build_timestamp} ({build_profile})</div>
  </div>
</header>
<div id="error-bar"></div>
<nav>
  <button data-tab="stats" class="active">Overview</button>
  <button data-tab="articles">Articles</button>
  <button data-tab="queue">Review queue</button>
  <button data-tab="rules">Rules</button>
  <button data-tab="sources">Sources</button>
</nav>
<main id="content"></main>
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

/// GET /static/cti.css
pub async fn serve_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], CTI_CSS)
}

/// Build UI routes (public)
pub fn ui_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(serve_index))
        .route("/static/app.js", get(serve_app_js))
        .route("/static/cti.css", get(serve_css))
}
