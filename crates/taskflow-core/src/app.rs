use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::api::ApiClient;
use crate::config::Settings;
use crate::datetime::today_in;
use crate::error::BotResult;
use crate::session::{Session, SessionStore};

/// Presentation knobs resolved once from [`Settings`].
#[derive(Debug, Clone)]
pub struct UiSettings {
    pub page_size: usize,
    pub group_page_size: usize,
    pub category_page_size: usize,
    pub timezone: Tz,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            group_page_size: 8,
            category_page_size: 8,
            timezone: Tz::UTC,
        }
    }
}

impl From<&Settings> for UiSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            page_size: settings.page_size.max(1),
            group_page_size: settings.group_page_size.max(1),
            category_page_size: settings.category_page_size.max(1),
            timezone: settings.timezone(),
        }
    }
}

/// Who sent the update, as far as the chat transport tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ChatUser {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            first_name: None,
            last_name: None,
        }
    }
}

/// Shared state handed to every handler.
pub struct App {
    pub api: ApiClient,
    pub ui: UiSettings,
    store: Arc<dyn SessionStore>,
}

impl App {
    pub fn new(api: ApiClient, store: Arc<dyn SessionStore>, ui: UiSettings) -> Self {
        Self { api, ui, store }
    }

    pub fn from_settings(settings: &Settings, store: Arc<dyn SessionStore>) -> BotResult<Self> {
        let api = ApiClient::new(
            &settings.api_base_url,
            &settings.api_prefix,
            settings.request_timeout(),
            store.clone(),
        )?;
        Ok(Self::new(api, store, UiSettings::from(settings)))
    }

    pub fn session(&self, user_id: i64) -> Session {
        Session::new(self.store.clone(), user_id, self.ui.page_size)
    }

    pub fn today(&self) -> NaiveDate {
        today_in(&self.ui.timezone)
    }
}
