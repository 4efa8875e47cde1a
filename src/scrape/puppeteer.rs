use std::{ffi::OsStr, sync::Arc, time::Duration};

use headless_chrome::{
    Browser, Element, LaunchOptions, Tab,
    protocol::cdp::Network,
};
use serde_json::Value;

use crate::config::constants::WINDOW_SIZE;

pub fn puppeteer(headless: bool) -> anyhow::Result<Browser> {
    Browser::new(LaunchOptions {
        args: vec![OsStr::new("--disable-blink-features=AutomationControlled")],
        headless,
        window_size: Some(WINDOW_SIZE),
        ..LaunchOptions::default()
    })
}

#[allow(clippy::significant_drop_tightening)]
pub fn first_tab(browser: &Browser) -> anyhow::Result<Arc<Tab>> {
    let tab = browser.new_tab()?;

    {
        let tabs_guard = browser
            .get_tabs()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for remain in &*tabs_guard {
            if !Arc::ptr_eq(&tab, remain) {
                remain.close(true)?;
            }
        }
    }

    Ok(tab)
}

/// Drops requests whose URL matches any of `patterns` (`*` wildcards).
pub fn block_urls(tab: &Tab, patterns: &[&str]) -> anyhow::Result<()> {
    tab.call_method(Network::Enable {
        max_total_buffer_size: None,
        max_resource_buffer_size: None,
        max_post_data_size: None,
    })?;
    tab.call_method(Network::SetBlockedURLs {
        urls: patterns.iter().map(|&p| p.to_owned()).collect(),
    })?;
    Ok(())
}

pub fn navigate_to(tab: &Tab, url: &str) -> anyhow::Result<()> {
    tab.navigate_to(url)?.wait_until_navigated()?;
    Ok(())
}

pub fn wait_css<'tab>(tab: &'tab Tab, selector: &str, timeout: Duration) -> anyhow::Result<Element<'tab>> {
    tab.wait_for_element_with_custom_timeout(selector, timeout)
}

pub fn wait_xpath<'tab>(tab: &'tab Tab, xpath: &str, timeout: Duration) -> anyhow::Result<Element<'tab>> {
    tab.wait_for_xpath_with_custom_timeout(xpath, timeout)
}

/// Clicks through script instead of a synthesized mouse event, so overlays
/// and animations in progress cannot swallow it.
pub fn force_click(element: &Element<'_>) -> anyhow::Result<()> {
    element.call_js_fn("function() { this.click(); }", Vec::new(), false)?;
    Ok(())
}

/// Sets a checkbox to checked, clicking only when it is not already.
pub fn ensure_checked(element: &Element<'_>) -> anyhow::Result<()> {
    let ret = element.call_js_fn(
        "function() { if (!this.checked) { this.click(); } return this.checked; }",
        Vec::new(),
        false,
    )?;

    match ret.value {
        Some(Value::Bool(true)) => Ok(()),
        Some(value) => anyhow::bail!("checkbox still unchecked: {value}"),
        None => anyhow::bail!("returned nothing"),
    }
}

pub fn fill(element: &Element<'_>, text: &str) -> anyhow::Result<()> {
    element.call_js_fn("function() { this.value = ''; }", Vec::new(), false)?;
    element.type_into(text)?;
    Ok(())
}

/// Text of the last element matching `xpath`.
pub fn last_inner_text(tab: &Tab, xpath: &str) -> anyhow::Result<String> {
    let elements = tab.find_elements_by_xpath(xpath)?;
    let last = elements
        .last()
        .ok_or_else(|| anyhow::anyhow!("nothing matches {xpath}"))?;
    last.get_inner_text()
}
