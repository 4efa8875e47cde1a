//! Thin blocking helpers over `headless_chrome`.
//!
//! Everything here blocks the calling thread; callers on the async runtime go
//! through `spawn_blocking`.

mod puppeteer;

pub use puppeteer::{
    block_urls, ensure_checked, fill, first_tab, force_click, last_inner_text, navigate_to,
    puppeteer, wait_css, wait_xpath,
};

/// Images only slow the order list down.
pub const BLOCKED_RESOURCES: [&str; 5] = ["*.png*", "*.jpg*", "*.jpeg*", "*.gif*", "*.svg*"];

/// XPath for "element `tag` whose text contains `text`", with an optional
/// extra class requirement.
pub fn xpath_with_text(tag: &str, class: Option<&str>, text: &str) -> String {
    class.map_or_else(
        || format!("//{tag}[contains(normalize-space(.), \"{text}\")]"),
        |class| {
            format!(
                "//{tag}[contains(concat(' ', normalize-space(@class), ' '), ' {class} ')][contains(normalize-space(.), \"{text}\")]"
            )
        },
    )
}
