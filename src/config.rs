use core::{fmt, time::Duration};
use std::path::PathBuf;

use compact_str::CompactString;

pub mod constants {
    use core::time::Duration;

    macro_rules! env_or_default {
        ($name:expr, $default:expr) => {
            if let Some(s) = option_env!($name) {
                s
            } else {
                $default
            }
        };
    }

    pub const PORTAL_ORIGIN: &str = env_or_default!("PORTAL_ORIGIN", "https://merchant.shoalter.com");
    pub const DATA_FILE_NAME: &str = env_or_default!("ORDER_DATA_FILE_NAME", "order_data.json");
    pub const STOREFRONTS: [&str; 6] = [
        "H0956004", "H0956006", "H0956007", "H0956008", "H0956010", "H0956012",
    ];
    /// Hong Kong time, the zone the portal's pick-up dates live in.
    pub const UTC_OFFSET_HOURS: i32 = 8;
    pub const POLL_INTERVAL: Duration = Duration::from_secs(180);
    pub const DASHBOARD_REFRESH: Duration = Duration::from_secs(10);
    pub const WINDOW_SIZE: (u32, u32) = (1920, 1080);
}

/// Order-fulfilment stages tracked on the dashboard, in scrape order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Confirmed,
    Acknowledged,
    Packed,
    Picked,
}

impl Status {
    pub const ALL: [Self; 4] = [Self::Confirmed, Self::Acknowledged, Self::Packed, Self::Picked];

    /// Value of the status checkbox in the portal, also the snapshot key.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::Packed => "PACKED",
            Self::Picked => "PICKED",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Confirmed => "已建立",
            Self::Acknowledged => "已確認",
            Self::Packed => "已包裝",
            Self::Picked => "已出貨",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Both values must be present and non-blank.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        let username = username.filter(|s| !s.trim().is_empty())?;
        let password = password.filter(|s| !s.is_empty())?;
        Some(Self { username, password })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct PortalConfig {
    pub origin: CompactString,
    pub storefronts: Vec<CompactString>,
    pub headless: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            origin: CompactString::const_new(constants::PORTAL_ORIGIN),
            storefronts: constants::STOREFRONTS.into_iter().map(CompactString::const_new).collect(),
            headless: true,
        }
    }
}

/// Every fixed delay of a cycle. The portal is slow and renders stale counts
/// before refreshing, so most steps wait a little before the next one.
#[derive(Clone, Debug)]
pub struct Timings {
    pub element_timeout: Duration,
    pub login_settle: Duration,
    pub navigation_settle: Duration,
    pub toggle_timeout: Duration,
    pub toggle_settle: Duration,
    pub menu_settle: Duration,
    pub clear_settle: Duration,
    pub check_settle: Duration,
    /// Gap between two reads of the result label.
    pub label_poll: Duration,
    pub label_max_polls: u32,
    /// Polls after which a label still showing an old count is accepted.
    pub label_unchanged_polls: u32,
    /// Used once when the label could not be read while polling.
    pub label_fallback: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(5),
            login_settle: Duration::from_secs(5),
            navigation_settle: Duration::from_secs(5),
            toggle_timeout: Duration::from_secs(3),
            toggle_settle: Duration::from_secs(3),
            menu_settle: Duration::from_millis(1500),
            clear_settle: Duration::from_millis(1000),
            check_settle: Duration::from_millis(1000),
            label_poll: Duration::from_millis(1000),
            label_max_polls: 10,
            label_unchanged_polls: 6,
            label_fallback: Duration::from_secs(6),
        }
    }
}

impl Timings {
    pub const fn instant() -> Self {
        Self {
            element_timeout: Duration::ZERO,
            login_settle: Duration::ZERO,
            navigation_settle: Duration::ZERO,
            toggle_timeout: Duration::ZERO,
            toggle_settle: Duration::ZERO,
            menu_settle: Duration::ZERO,
            clear_settle: Duration::ZERO,
            check_settle: Duration::ZERO,
            label_poll: Duration::ZERO,
            label_max_polls: 10,
            label_unchanged_polls: 3,
            label_fallback: Duration::ZERO,
        }
    }
}

/// `order_data.json` next to the running executable, or in the working
/// directory when the executable path is unavailable.
pub fn default_data_file() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(constants::DATA_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(constants::DATA_FILE_NAME))
}
