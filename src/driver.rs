use thirtyfour::prelude::*;
use thirtyfour::PageLoadStrategy;
use rand::{seq::SliceRandom, SeedableRng};
use rand::rngs::StdRng;
use std::time::Duration;

static UAS: &[&str] = &[
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
];
static SIZES: &[(u32, u32)] = &[(1366, 768), (1400, 900), (1600, 900), (1680, 1050)];

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub locale: String,
    /// Fixed user agent; `None` picks one from the built-in pool.
    pub user_agent: Option<String>,
    pub webdriver_url: String,
}

/// Chrome switches for one session. `seed` picks the UA (unless fixed) and
/// window size.
pub fn chrome_args(opts: &BrowserOptions, seed: u64) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--disable-gpu".into(),
        "--no-sandbox".into(),
        "--disable-dev-shm-usage".into(),
        "--disable-blink-features=AutomationControlled".into(),
        "--disable-notifications".into(),
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
    ];
    if opts.headless {
        args.push("--headless=new".into());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let ua = match &opts.user_agent {
        Some(ua) => ua.clone(),
        None => UAS.choose(&mut rng).copied().unwrap_or(UAS[0]).to_string(),
    };
    let (w, h) = SIZES.choose(&mut rng).copied().unwrap_or(SIZES[0]);

    args.push(format!("--user-agent={ua}"));
    args.push(format!("--lang={}", opts.locale));
    args.push(format!("--window-size={w},{h}"));
    args
}

pub async fn make_driver(opts: &BrowserOptions, seed: u64) -> WebDriverResult<WebDriver> {
    let mut caps = DesiredCapabilities::chrome();
    for a in chrome_args(opts, seed) {
        caps.add_arg(&a)?;
    }
    caps.set_page_load_strategy(PageLoadStrategy::Eager)?;

    let driver = WebDriver::new(&opts.webdriver_url, caps).await?;
    driver.set_script_timeout(Duration::from_secs(30)).await?;
    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(headless: bool, ua: Option<&str>) -> BrowserOptions {
        BrowserOptions {
            headless,
            locale: "de-DE".into(),
            user_agent: ua.map(String::from),
            webdriver_url: "http://127.0.0.1:9515".into(),
        }
    }

    #[test]
    fn configured_user_agent_and_locale_win() {
        let args = chrome_args(&opts(true, Some("TestAgent/1.0")), 7);
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--user-agent=TestAgent/1.0".to_string()));
        assert!(args.contains(&"--lang=de-DE".to_string()));
    }

    #[test]
    fn pooled_user_agent_is_stable_per_seed() {
        let a = chrome_args(&opts(false, None), 42);
        let b = chrome_args(&opts(false, None), 42);
        assert_eq!(a, b);
        assert!(!a.iter().any(|s| s.starts_with("--headless")));
        let ua = a.iter().find(|s| s.starts_with("--user-agent=")).unwrap();
        assert!(UAS.iter().any(|u| ua.ends_with(u)));
    }
}
