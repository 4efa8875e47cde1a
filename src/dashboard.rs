//! Read-only consumer of the snapshot file: an HTML page that reloads itself
//! plus two JSON endpoints.

use core::{fmt::Write as _, time::Duration};
use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    response::Html,
    routing::get,
};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use tower_http::cors::CorsLayer;

use crate::{
    config::Status,
    poller::PollStats,
    snapshot::{DateRecord, Snapshot, SnapshotStore},
    util::Clock,
};

const PLACEHOLDER: &str = "-";
const WAITING: &str = "waiting for first data ...";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Banner {
    /// Data is fresh; the scraper is cycling.
    Active,
    /// Nothing recent: cooling down between cycles, stalled, or not started.
    Resting,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayView {
    pub title: &'static str,
    pub date: String,
    pub counts: [(Status, String); 4],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DashboardView {
    pub waiting: bool,
    pub banner: Banner,
    pub status_msg: String,
    pub last_updated: String,
    pub today: DayView,
    pub tomorrow: DayView,
}

impl DayView {
    fn new(title: &'static str, record: &DateRecord) -> Self {
        let value = |v: Option<&str>| v.unwrap_or(PLACEHOLDER).to_owned();
        Self {
            title,
            date: value(record.date.as_deref()),
            counts: Status::ALL.map(|status| (status, value(record.get(status)))),
        }
    }
}

impl DashboardView {
    /// `stale_after` is how old `last_updated` may be for the banner to stay
    /// active.
    pub fn build(snapshot: Option<&Snapshot>, now: NaiveDateTime, stale_after: Duration) -> Self {
        let empty = Snapshot::default();
        let waiting = snapshot.is_none_or(|s| s.last_updated.is_none());
        let snapshot = snapshot.unwrap_or(&empty);

        let fresh = snapshot
            .last_updated
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
            .and_then(|at| (now - at).to_std().ok().or(Some(Duration::ZERO)))
            .is_some_and(|age| age <= stale_after);

        Self {
            waiting,
            banner: if fresh { Banner::Active } else { Banner::Resting },
            status_msg: snapshot
                .status_msg
                .clone()
                .unwrap_or_else(|| WAITING.to_owned()),
            last_updated: snapshot
                .last_updated
                .clone()
                .unwrap_or_else(|| PLACEHOLDER.to_owned()),
            today: DayView::new("today", &snapshot.today),
            tomorrow: DayView::new("tomorrow", &snapshot.tomorrow),
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn render_html(view: &DashboardView, refresh: Duration) -> String {
    let mut html = String::with_capacity(4096);
    let _ = write!(
        html,
        "<!doctype html><html><head><meta charset=\"utf-8\"><meta http-equiv=\"refresh\" content=\"{}\"><title>Order monitor</title>\
<style>body{{font-family:sans-serif;margin:2em}}.banner{{padding:.6em 1em;border-radius:6px}}.active{{background:#e3f6e5}}.resting{{background:#fdf1dc}}\
.days{{display:flex;gap:3em}}.count{{font-size:2em;font-weight:bold}}td{{padding:.3em 1em}}</style></head><body><h1>Order monitor</h1>",
        refresh.as_secs().max(1),
    );
    let _ = write!(html, "<p>last updated: <b>{}</b></p>", escape(&view.last_updated));

    let (class, state) = match view.banner {
        Banner::Active => ("active", "active"),
        Banner::Resting => ("resting", "resting / cooling down"),
    };
    let _ = write!(
        html,
        "<div class=\"banner {class}\">[{state}] {}</div>",
        escape(&view.status_msg)
    );

    if view.waiting {
        let _ = write!(html, "<p class=\"waiting\">{WAITING}</p>");
    }

    html.push_str("<div class=\"days\">");
    for day in [&view.today, &view.tomorrow] {
        let _ = write!(
            html,
            "<section><h2>{} <small>{}</small></h2><table>",
            day.title,
            escape(&day.date)
        );
        for (status, count) in &day.counts {
            let _ = write!(
                html,
                "<tr><td>{} {}</td><td class=\"count\">{}</td></tr>",
                status.code(),
                status.label(),
                escape(count)
            );
        }
        html.push_str("</table></section>");
    }
    html.push_str("</div></body></html>");
    html
}

#[derive(Clone)]
pub struct DashboardState {
    pub store: SnapshotStore,
    pub clock: Arc<dyn Clock>,
    pub stale_after: Duration,
    pub refresh: Duration,
    pub stats: Option<Arc<Mutex<PollStats>>>,
}

impl DashboardState {
    /// Unreadable and missing files both read as "no data yet". The file is
    /// read on the blocking pool.
    async fn snapshot(&self) -> Option<Snapshot> {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                tracing::debug!(target: "dashboard", "snapshot not readable yet: {e}");
                None
            }
            Err(e) => {
                tracing::error!(target: "dashboard", "\x1b[31msnapshot read aborted\x1b[0m: {e}");
                None
            }
        }
    }

    pub async fn view(&self) -> DashboardView {
        let snapshot = self.snapshot().await;
        DashboardView::build(snapshot.as_ref(), self.clock.now().naive_local(), self.stale_after)
    }
}

async fn index(State(state): State<DashboardState>) -> Html<String> {
    Html(render_html(&state.view().await, state.refresh))
}

async fn snapshot(State(state): State<DashboardState>) -> Json<Option<Snapshot>> {
    Json(state.snapshot().await)
}

async fn poller(State(state): State<DashboardState>) -> Json<Option<PollStats>> {
    Json(state.stats.as_ref().map(|stats| stats.lock().clone()))
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/snapshot", get(snapshot))
        .route("/api/poller", get(poller))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: DashboardState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "dashboard", "serving on \x1b[1;36mhttp://{}\x1b[0m, reading {}", listener.local_addr()?, state.store.path().display());
    axum::serve(listener, router(state)).await
}
