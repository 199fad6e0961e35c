//! A per-browser id stored in a cookie. It keys every record this device writes. It is not a
//! credential: anyone can read or forge it.
use std::cell::RefCell;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEVICE_ID_COOKIE: &str = "calendar_device_id";
const COOKIE_MAX_AGE_SECS: u32 = 60 * 60 * 24 * 365;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to write cookie: {0}")]
pub struct CookieError(String);

/// Access to the `document.cookie` string.
pub trait CookieJar {
    /// All visible cookies, `name=value; other=value`.
    fn cookies(&self) -> String;

    /// Write a single `name=value; attribute...` cookie.
    fn set_cookie(&self, cookie: &str) -> Result<(), CookieError>;
}

#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCookieJar;

#[cfg(target_arch = "wasm32")]
fn html_document() -> Option<web_sys::HtmlDocument> {
    use wasm_bindgen::JsCast;
    web_sys::window()?.document()?.dyn_into().ok()
}

#[cfg(target_arch = "wasm32")]
impl CookieJar for DocumentCookieJar {
    fn cookies(&self) -> String {
        html_document()
            .and_then(|document| document.cookie().ok())
            .unwrap_or_default()
    }

    fn set_cookie(&self, cookie: &str) -> Result<(), CookieError> {
        let document = html_document().ok_or_else(|| CookieError("no document".to_string()))?;
        document
            .set_cookie(cookie)
            .map_err(|e| CookieError(format!("{e:?}")))
    }
}

/// Cookie storage that lives only as long as the process. Attributes are ignored.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: RefCell<BTreeMap<String, String>>,
    writes: RefCell<Vec<String>>,
    reject_writes: bool,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// A jar whose writes always fail, like a browser with cookies disabled.
    pub fn rejecting_writes() -> Self {
        Self {
            reject_writes: true,
            ..Self::default()
        }
    }

    /// Every cookie string written so far, attributes included.
    pub fn writes(&self) -> Vec<String> {
        self.writes.borrow().clone()
    }
}

impl CookieJar for MemoryCookieJar {
    fn cookies(&self) -> String {
        self.cookies
            .borrow()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_cookie(&self, cookie: &str) -> Result<(), CookieError> {
        if self.reject_writes {
            return Err(CookieError("cookies are disabled".to_string()));
        }
        self.writes.borrow_mut().push(cookie.to_string());
        let pair = cookie.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            return Err(CookieError(format!("malformed cookie {cookie:?}")));
        };
        self.cookies
            .borrow_mut()
            .insert(name.trim().to_string(), value.trim().to_string());
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub type PlatformCookieJar = DocumentCookieJar;
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformCookieJar = MemoryCookieJar;

/// Finds and url-decodes a cookie value. Empty values count as missing.
fn read_cookie(cookies: &str, name: &str) -> Option<String> {
    let raw = cookies
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(name)?.strip_prefix('='))?;
    match urlencoding::decode(raw) {
        Ok(value) if !value.is_empty() => Some(value.into_owned()),
        Ok(_) => None,
        Err(e) => {
            log::error!("Device id cookie is not valid UTF-8 after decoding: {e}");
            None
        }
    }
}

pub struct DeviceIdentity<J> {
    jar: J,
    // Used when the cookie could not be written, so the id stays stable for this session.
    fallback: RefCell<Option<DeviceId>>,
}

impl<J: CookieJar> DeviceIdentity<J> {
    pub fn new(jar: J) -> Self {
        Self {
            jar,
            fallback: RefCell::new(None),
        }
    }

    /// Never fails. If the cookie can't be written the id only lives in memory until the page
    /// is closed; that is logged but otherwise invisible to callers.
    pub fn get_or_create_device_id(&self) -> DeviceId {
        if let Some(id) = read_cookie(&self.jar.cookies(), DEVICE_ID_COOKIE) {
            return DeviceId(id);
        }
        if let Some(id) = self.fallback.borrow().as_ref() {
            return id.clone();
        }

        let id = DeviceId::generate();
        let cookie = format!(
            "{DEVICE_ID_COOKIE}={}; path=/; max-age={COOKIE_MAX_AGE_SECS}",
            urlencoding::encode(id.as_str())
        );
        match self.jar.set_cookie(&cookie) {
            Ok(()) => log::info!("Created device id {id}"),
            Err(e) => {
                log::warn!("{e}, device id {id} will only last for this session");
                *self.fallback.borrow_mut() = Some(id.clone());
            }
        }
        id
    }
}
