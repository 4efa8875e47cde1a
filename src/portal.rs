use core::time::Duration;
use std::sync::Arc;

use chrono::NaiveDate;
use compact_str::CompactString;
use headless_chrome::{Browser, Tab};
use url::Url;

use crate::{
    config::{Credentials, PortalConfig, Status, Timings},
    count::{ZERO, extract_count},
    scrape::{self, xpath_with_text},
    snapshot::{CycleUpdate, DateRecord, Snapshot, SnapshotStore},
    util::{Clock, iso_date, scrape_dates, stamp},
};

mod selectors {
    pub const ACCOUNT: &str = "#account";
    pub const PASSWORD: &str = "#password";
    pub const LOGIN_SUBMIT: &str = r#"button[data-testid="繼續"]"#;
    pub const CLEAR_ALL: &str = r#"button[data-testid="清除全部"]"#;
    pub const APPLY: &str = r#"button[data-testid="套用"]"#;
    pub const MERCHANT_DELIVERY_TEXT: &str = "商戶8小時送貨";
    pub const STATUS_MENU_CLASS: &str = "ant-select-selector";
    pub const STATUS_MENU_TEXT: &str = "運單狀態";
    pub const RESULT_TEXT: &str = "結果";
}

const ORDER_LIST_PATH: &str = "/zh/order-management/orders/toship";
const LOGIN_PATH: &str = "/login";

/// One browser page on the merchant portal. Every method is a single UI step;
/// sequencing and settling live in [`scrape_date`] and [`run_cycle`].
///
/// [`run_cycle`]: Orchestrator::run_cycle
pub trait OrderPortal {
    fn login(&mut self, credentials: &Credentials) -> anyhow::Result<()>;
    /// Whether the login form is gone.
    fn logged_in(&mut self) -> anyhow::Result<bool>;
    /// Order list pre-filtered to the storefronts and a one-day pick-up range.
    fn open_orders(&mut self, date: NaiveDate) -> anyhow::Result<()>;
    /// The one-time "merchant 8-hour delivery" toggle; fails when absent.
    fn toggle_merchant_delivery(&mut self) -> anyhow::Result<()>;
    fn open_status_menu(&mut self) -> anyhow::Result<()>;
    fn clear_statuses(&mut self) -> anyhow::Result<()>;
    /// Leaves `status` checked whether or not it already was.
    fn check_status(&mut self, status: Status) -> anyhow::Result<()>;
    fn apply_filter(&mut self) -> anyhow::Result<()>;
    fn result_label(&mut self) -> anyhow::Result<String>;

    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

pub trait Launcher: Send + Sync {
    type Portal: OrderPortal;

    fn launch(&self) -> anyhow::Result<Self::Portal>;
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("login form still present after submitting credentials")]
    LoginRejected,
}

pub fn order_url(config: &PortalConfig, date: NaiveDate) -> anyhow::Result<Url> {
    let date = iso_date(date);
    let storefronts = config
        .storefronts
        .iter()
        .map(CompactString::as_str)
        .collect::<Vec<_>>()
        .join(",");

    let mut url = Url::parse(&config.origin)?.join(ORDER_LIST_PATH)?;
    url.query_pairs_mut()
        .append_pair("bu", "HKTV")
        .append_pair("deliveryType", "STANDARD_DELIVERY")
        .append_pair("productReadyMethod", "STANDARD_DELIVERY_ALL")
        .append_pair("searchType", "ORDER_ID")
        .append_pair("storefrontCodes", &storefronts)
        .append_pair("dateType", "PICK_UP_DATE")
        .append_pair("startDate", &date)
        .append_pair("endDate", &date)
        .append_pair("pageSize", "20")
        .append_pair("pageNumber", "1")
        .append_pair("sortColumn", "orderDate")
        .append_pair("waybillStatuses", "");
    Ok(url)
}

pub fn login_url(config: &PortalConfig) -> anyhow::Result<Url> {
    Ok(Url::parse(&config.origin)?.join(LOGIN_PATH)?)
}

/// Waits for the result label to stop changing after a filter is applied.
///
/// The portal first keeps showing an old count (the previous filter's, or the
/// unfiltered total) and refreshes later. A reading is accepted once two
/// consecutive polls agree and it is not one of the `stale` texts, or, for a
/// stale-looking text, once `label_unchanged_polls` polls have passed. If no
/// poll could read the label at all, one fixed fallback delay precedes a final
/// read.
pub fn settle_label<P: OrderPortal + ?Sized>(
    portal: &mut P,
    stale: &[&str],
    timings: &Timings,
) -> anyhow::Result<String> {
    let mut last: Option<String> = None;

    for poll in 1..=timings.label_max_polls {
        portal.pause(timings.label_poll);
        let text = match portal.result_label() {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(target: "portal", "result label not readable on poll {poll}: {e}");
                last = None;
                continue;
            }
        };

        let stable = last.as_deref() == Some(text.as_str());
        let moved = !stale.contains(&text.as_str());
        if stable && (moved || poll >= timings.label_unchanged_polls) {
            return Ok(text);
        }
        last = Some(text);
    }

    if let Some(text) = last {
        tracing::debug!(target: "portal", "result label did not settle, using {text:?}");
        return Ok(text);
    }

    portal.pause(timings.label_fallback);
    portal.result_label()
}

/// Filter to exactly `status` and read the count it yields. `total` is the
/// label as shown before any status filter.
pub fn read_status<P: OrderPortal + ?Sized>(
    portal: &mut P,
    status: Status,
    total: Option<&str>,
    timings: &Timings,
) -> anyhow::Result<CompactString> {
    portal.open_status_menu()?;
    portal.pause(timings.menu_settle);

    // selections accumulate unless cleared
    portal.clear_statuses()?;
    portal.pause(timings.clear_settle);

    portal.check_status(status)?;
    portal.pause(timings.check_settle);

    let before = portal.result_label().ok();
    portal.apply_filter()?;

    let stale = [before.as_deref(), total].into_iter().flatten().collect::<Vec<_>>();
    let text = settle_label(portal, &stale, timings)?;
    Ok(extract_count(Some(&text)))
}

/// Counts of every status for one pick-up date.
///
/// Only the page navigation can fail the date; a failing status is logged and
/// recorded as `"0"`.
pub fn scrape_date<P: OrderPortal + ?Sized>(
    portal: &mut P,
    date: NaiveDate,
    timings: &Timings,
) -> anyhow::Result<DateRecord> {
    portal.open_orders(date)?;
    portal.pause(timings.navigation_settle);

    match portal.toggle_merchant_delivery() {
        Ok(()) => portal.pause(timings.toggle_settle),
        Err(e) => tracing::debug!(target: "portal", "[{date}] no merchant delivery toggle: {e}"),
    }

    let total = portal.result_label().ok();
    tracing::debug!(target: "portal", "[{date}] unfiltered label: {total:?}");

    let mut record = DateRecord::for_date(iso_date(date));
    for status in Status::ALL {
        let count = match read_status(portal, status, total.as_deref(), timings) {
            Ok(count) => {
                tracing::info!(target: "portal", "[{date}] {} ({}) = \x1b[1;36m{count}\x1b[0m", status, status.label());
                count
            }
            Err(e) => {
                tracing::warn!(target: "portal", "[{date}] \x1b[31m{} ({}) failed\x1b[0m: {e:?}", status, status.label());
                CompactString::const_new(ZERO)
            }
        };
        record.set(status, count);
    }

    Ok(record)
}

pub fn status_message(interval: Duration) -> String {
    format!(
        "⚡ polling active: refreshing every {} min",
        interval.as_secs().div_ceil(60).max(1)
    )
}

/// Everything one cycle needs: log in once, scrape today and tomorrow, and
/// commit both to the store.
pub struct Orchestrator<L> {
    pub launcher: L,
    pub credentials: Credentials,
    pub store: SnapshotStore,
    pub clock: Arc<dyn Clock>,
    pub timings: Timings,
    pub status_msg: String,
    /// Fail the cycle when the login form survives the login attempt.
    pub verify_login: bool,
}

impl<L: Launcher> Orchestrator<L> {
    /// Either commits a complete snapshot or returns an error without writing.
    pub fn run_cycle(&self) -> anyhow::Result<Snapshot> {
        let now = self.clock.now();
        let (today, tomorrow) = scrape_dates(now);

        let mut portal = self.launcher.launch()?;

        tracing::info!(target: "portal", "\x1b[32mlogging in\x1b[0m as {} (local time {})", self.credentials.username, now.format("%H:%M:%S"));
        portal.login(&self.credentials)?;
        portal.pause(self.timings.login_settle);
        if self.verify_login && !portal.logged_in()? {
            return Err(CycleError::LoginRejected.into());
        }

        tracing::info!(target: "portal", "scraping \x1b[33mtoday\x1b[0m ({today}) ...");
        let today = scrape_date(&mut portal, today, &self.timings)?;
        tracing::info!(target: "portal", "scraping \x1b[33mtomorrow\x1b[0m ({tomorrow}) ...");
        let tomorrow = scrape_date(&mut portal, tomorrow, &self.timings)?;
        drop(portal);

        let snapshot = self.store.commit(CycleUpdate {
            today,
            tomorrow,
            status_msg: self.status_msg.clone(),
            last_updated: stamp(now),
        })?;
        Ok(snapshot)
    }
}

/// Live portal page in a fresh Chrome instance.
pub struct ChromePortal {
    tab: Arc<Tab>,
    config: PortalConfig,
    timings: Timings,
    _browser: Browser,
}

impl ChromePortal {
    pub fn open(config: PortalConfig, timings: Timings) -> anyhow::Result<Self> {
        let browser = scrape::puppeteer(config.headless)?;
        let tab = scrape::first_tab(&browser)?;
        tab.set_default_timeout(timings.element_timeout);
        if let Err(e) = scrape::block_urls(&tab, &scrape::BLOCKED_RESOURCES) {
            tracing::warn!(target: "portal", "image blocking unavailable: {e}");
        }
        Ok(Self {
            tab,
            config,
            timings,
            _browser: browser,
        })
    }
}

impl OrderPortal for ChromePortal {
    fn login(&mut self, credentials: &Credentials) -> anyhow::Result<()> {
        use selectors::{ACCOUNT, LOGIN_SUBMIT, PASSWORD};

        let timeout = self.timings.element_timeout;
        scrape::navigate_to(&self.tab, login_url(&self.config)?.as_str())?;
        scrape::fill(&scrape::wait_css(&self.tab, ACCOUNT, timeout)?, &credentials.username)?;
        scrape::fill(&scrape::wait_css(&self.tab, PASSWORD, timeout)?, &credentials.password)?;
        scrape::force_click(&scrape::wait_css(&self.tab, LOGIN_SUBMIT, timeout)?)
    }

    fn logged_in(&mut self) -> anyhow::Result<bool> {
        Ok(self.tab.find_element(selectors::ACCOUNT).is_err())
    }

    fn open_orders(&mut self, date: NaiveDate) -> anyhow::Result<()> {
        scrape::navigate_to(&self.tab, order_url(&self.config, date)?.as_str())
    }

    fn toggle_merchant_delivery(&mut self) -> anyhow::Result<()> {
        let xpath = xpath_with_text("button", None, selectors::MERCHANT_DELIVERY_TEXT);
        scrape::force_click(&scrape::wait_xpath(&self.tab, &xpath, self.timings.toggle_timeout)?)
    }

    fn open_status_menu(&mut self) -> anyhow::Result<()> {
        let xpath = xpath_with_text(
            "div",
            Some(selectors::STATUS_MENU_CLASS),
            selectors::STATUS_MENU_TEXT,
        );
        scrape::force_click(&scrape::wait_xpath(&self.tab, &xpath, self.timings.element_timeout)?)
    }

    fn clear_statuses(&mut self) -> anyhow::Result<()> {
        scrape::force_click(&scrape::wait_css(&self.tab, selectors::CLEAR_ALL, self.timings.element_timeout)?)
    }

    fn check_status(&mut self, status: Status) -> anyhow::Result<()> {
        let selector = format!("input[value=\"{}\"]", status.code());
        scrape::ensure_checked(&scrape::wait_css(&self.tab, &selector, self.timings.element_timeout)?)
    }

    fn apply_filter(&mut self) -> anyhow::Result<()> {
        scrape::force_click(&scrape::wait_css(&self.tab, selectors::APPLY, self.timings.element_timeout)?)
    }

    fn result_label(&mut self) -> anyhow::Result<String> {
        scrape::last_inner_text(&self.tab, &xpath_with_text("span", None, selectors::RESULT_TEXT))
    }
}

pub struct ChromeLauncher {
    pub config: PortalConfig,
    pub timings: Timings,
}

impl Launcher for ChromeLauncher {
    type Portal = ChromePortal;

    fn launch(&self) -> anyhow::Result<ChromePortal> {
        ChromePortal::open(self.config.clone(), self.timings.clone())
    }
}
