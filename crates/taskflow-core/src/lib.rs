pub mod action;
pub mod api;
pub mod app;
pub mod config;
pub mod datetime;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod grouping;
pub mod profile;
pub mod query;
pub mod render;
pub mod session;
pub mod task;
pub mod view;
pub mod wizard;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

pub use app::{App, ChatUser, UiSettings};
pub use config::{SessionBackend, Settings};
pub use dispatch::{Inbound, dispatch};
pub use error::{BotError, BotResult};
pub use view::{Markup, RenderTarget, Reply, Screen};

use session::{FileStore, MemoryStore, SessionStore};

/// Builds the session store selected in `settings`.
#[tracing::instrument(skip_all)]
pub fn open_store(
  settings: &Settings
) -> anyhow::Result<Arc<dyn SessionStore>> {
  match settings.session.backend {
    | SessionBackend::Memory => {
      info!("using in-memory session store");
      Ok(Arc::new(MemoryStore::new()))
    }
    | SessionBackend::File => {
      let path = settings.session_path()?;
      info!(path = %path.display(), "using file session store");
      let store = FileStore::open(&path)
        .with_context(|| {
          format!(
            "failed to open session store {}",
            path.display()
          )
        })?;
      Ok(Arc::new(store))
    }
  }
}

/// Resolves settings into a ready [`App`].
pub fn build_app(
  settings: &Settings
) -> anyhow::Result<App> {
  let store = open_store(settings)?;
  App::from_settings(settings, store)
    .context("failed to build API client")
}
