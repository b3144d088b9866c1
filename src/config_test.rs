use super::*;

/// # Safety
/// Env-mutating tests share one lock so they never race each other.
unsafe fn clear_plandesk_env() {
    unsafe {
        std::env::remove_var("PLANDESK_API_URL");
        std::env::remove_var("PLANDESK_API_TOKEN");
        std::env::remove_var("PLANDESK_PAGE_SIZE");
        std::env::remove_var("PLANDESK_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("PLANDESK_FETCH_RETRIES");
        std::env::remove_var("PLANDESK_REDIRECT_DELAY_MS");
    }
}

static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn env_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[test]
fn from_env_defaults() {
    let _guard = env_guard();
    unsafe { clear_plandesk_env() };

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg, ClientConfig::default());
    assert_eq!(cfg.api_url, DEFAULT_API_URL);
    assert_eq!(cfg.page_size, 10);
    assert!(cfg.api_token.is_none());
}

#[test]
fn from_env_parses_overrides() {
    let _guard = env_guard();
    unsafe {
        clear_plandesk_env();
        std::env::set_var("PLANDESK_API_URL", "https://api.example.test/");
        std::env::set_var("PLANDESK_API_TOKEN", " tok-123 ");
        std::env::set_var("PLANDESK_PAGE_SIZE", "25");
        std::env::set_var("PLANDESK_REQUEST_TIMEOUT_SECS", "5");
        std::env::set_var("PLANDESK_FETCH_RETRIES", "0");
        std::env::set_var("PLANDESK_REDIRECT_DELAY_MS", "250");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, "https://api.example.test");
    assert_eq!(cfg.api_token.as_deref(), Some("tok-123"));
    assert_eq!(cfg.page_size, 25);
    assert_eq!(cfg.request_timeout, Duration::from_secs(5));
    assert_eq!(cfg.fetch_retries, 0);
    assert_eq!(cfg.redirect_delay, Duration::from_millis(250));

    unsafe { clear_plandesk_env() };
}

#[test]
fn from_env_ignores_unparseable_numbers() {
    let _guard = env_guard();
    unsafe {
        clear_plandesk_env();
        std::env::set_var("PLANDESK_FETCH_RETRIES", "many");
    }

    let cfg = ClientConfig::from_env().unwrap();
    assert_eq!(cfg.fetch_retries, DEFAULT_FETCH_RETRIES);

    unsafe { clear_plandesk_env() };
}

#[test]
fn from_env_rejects_zero_page_size() {
    let _guard = env_guard();
    unsafe {
        clear_plandesk_env();
        std::env::set_var("PLANDESK_PAGE_SIZE", "0");
    }

    assert_eq!(ClientConfig::from_env(), Err(ConfigError::Zero { var: "PLANDESK_PAGE_SIZE" }));

    unsafe { clear_plandesk_env() };
}

#[test]
fn from_env_empty_token_is_none() {
    let _guard = env_guard();
    unsafe {
        clear_plandesk_env();
        std::env::set_var("PLANDESK_API_TOKEN", "   ");
    }

    assert!(ClientConfig::from_env().unwrap().api_token.is_none());

    unsafe { clear_plandesk_env() };
}

#[test]
fn normalize_api_url_requires_scheme() {
    assert_eq!(normalize_api_url("localhost:8000"), Err(ConfigError::InvalidUrl("localhost:8000".to_owned())));
    assert_eq!(normalize_api_url(" http://h:1// ").unwrap(), "http://h:1");
}
