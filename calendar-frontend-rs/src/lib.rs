#![deny(clippy::string_slice)]

pub mod config;
pub mod device_id;
pub mod gifts;
pub mod letters;
pub mod progress;
pub mod reconcile;
pub mod session;
pub mod unlock;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use keepsake::StoreError;
use keepsake::schedule::{IntervalHandle, PlatformClock, spawn_local};
use keepsake::supabase::{SupabaseConfig, SupabaseStore};
use wasm_bindgen::prelude::*;

use crate::config::{CalendarConfig, ConfigError};
use crate::device_id::{DeviceIdentity, PlatformCookieJar};
use crate::gifts::GiftSelection;
use crate::letters::LettersError;
use crate::progress::ProgressRecord;
use crate::session::CalendarSession;
use crate::unlock::{OpenOutcome, ReplyOutcome, ResetOutcome, UnlockOutcome};

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Letters(#[from] LettersError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<CalendarError> for JsValue {
    fn from(error: CalendarError) -> Self {
        JsValue::from_str(&error.to_string())
    }
}

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
#[allow(clippy::declare_interior_mutable_const)]
const LOGGER: LazyLock<()> = LazyLock::new(|| {
    // better error messages if our code ever panics
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Logging initialized");
});

type Session = CalendarSession<SupabaseStore, PlatformClock>;

/// The calendar as seen from the page.
#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub struct Calendar {
    session: Rc<Session>,
    // reconciliation poll and countdown tick, cleared by `teardown`
    timers: RefCell<Vec<IntervalHandle>>,
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
impl Calendar {
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(constructor))]
    pub async fn new(
        config: CalendarConfig,
        supabase_config: SupabaseConfig,
    ) -> Result<Calendar, JsValue> {
        #[allow(clippy::borrow_interior_mutable_const)]
        *LOGGER;

        let device_id =
            DeviceIdentity::new(PlatformCookieJar::default()).get_or_create_device_id();
        let store = Rc::new(SupabaseStore::new(supabase_config));
        let session = CalendarSession::load(store, PlatformClock::default(), device_id, config)
            .await
            .inspect_err(|e| log::error!("Error loading calendar: {e:?}"))?;

        Ok(Self {
            session: Rc::new(session),
            timers: RefCell::new(Vec::new()),
        })
    }

    /// Starts the reconciliation poll and the countdown tick. `on_change` is called with no
    /// arguments whenever the state changes; `on_tick` with the remaining cooldown in ms.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn start(&self, on_change: js_sys::Function, on_tick: js_sys::Function) {
        self.teardown();

        self.session.set_listener(move || {
            #[cfg(target_arch = "wasm32")]
            {
                let _ = on_change.call0(&JsValue::null());
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                let _ = &on_change;
            }
        });

        let (reconciling, reconcile_handle) =
            reconcile::reconciliation_loop(self.session.clone());
        let (ticking, tick_handle) = self.session.clone().countdown_loop(move |remaining_ms| {
            #[cfg(target_arch = "wasm32")]
            {
                let remaining_js = JsValue::from_f64(remaining_ms as f64);
                let _ = on_tick.call1(&JsValue::null(), &remaining_js);
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                let _ = (&on_tick, remaining_ms);
            }
        });
        spawn_local(reconciling);
        spawn_local(ticking);

        self.timers
            .borrow_mut()
            .extend([reconcile_handle, tick_handle]);
        log::info!("Calendar started");
    }

    /// Stops both timers and drops the change listener. Safe to call more than once.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn teardown(&self) {
        let timers = std::mem::take(&mut *self.timers.borrow_mut());
        for timer in &timers {
            timer.clear();
        }
        self.session.clear_listener();
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen(getter))]
    pub fn device_id(&self) -> String {
        self.session.device_id().to_string()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn request_open(&self, day: u32) -> OpenOutcome {
        self.session.request_open(day)
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub async fn submit_password(&self, input: String) -> UnlockOutcome {
        self.session.submit_password(&input).await
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub async fn reset_cooldown(&self, input: String) -> ResetOutcome {
        self.session.reset_cooldown(&input).await
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub async fn submit_reply(&self, day: u32, text: String) -> Result<ReplyOutcome, JsValue> {
        Ok(self.session.submit_reply(day, &text).await?)
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn close_dialog(&self) {
        self.session.close_dialog();
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn countdown_ms(&self) -> f64 {
        self.session.countdown_ms() as f64
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn countdown_label(&self) -> String {
        self.session.countdown_label()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn tiles(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.session.tiles())
            .map_err(|e| JsValue::from_str(&format!("Failed to serialize tiles: {e:?}")))
    }

    /// The dialog currently showing, as `{type: "closed" | "notice" | "password" | "letter"}`.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn dialog(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.session.state().dialog)
            .map_err(|e| JsValue::from_str(&format!("Failed to serialize dialog: {e:?}")))
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn progress(&self) -> ProgressRecord {
        self.session.progress()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn letter(&self, day: u32) -> Option<String> {
        self.session.letter(day)
    }

    /// True while an unlock, reset or reply is still being written.
    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn is_saving(&self) -> bool {
        !self.session.sync_status().is_idle()
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub fn last_sync_error(&self) -> Option<String> {
        self.session.sync_status().last_error
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub async fn check_gift_submitted(&self) -> bool {
        self.session.check_gift_submitted().await
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
    pub async fn submit_gift(&self, selection: GiftSelection) -> Result<String, JsValue> {
        Ok(self.session.save_gift_submission(selection).await?)
    }
}

impl Drop for Calendar {
    fn drop(&mut self) {
        self.teardown();
    }
}
