//! Multi-step text conversations: login, registration, task creation,
//! single-field task edits and category naming.
//!
//! The pending step lives in the session as a [`Prompt`]; values collected
//! along the way live in [`Scratch`]. Invalid input never advances the step.

use std::fmt;
use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::{Action, DueShortcut};
use crate::api::{NewTask, TaskPatch};
use crate::app::{App, ChatUser};
use crate::datetime::{format_api_date, parse_due};
use crate::engine;
use crate::error::{BotError, BotResult};
use crate::render;
use crate::session::{Session, UserState};
use crate::task::{Category, Priority};
use crate::view::{RenderTarget, Reply, Screen};

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

const DUE_HINT: &str = "Use today, tomorrow, +N, DD-MM-YYYY or «-» for no deadline.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Prompt {
    Search,
    LoginEmail,
    LoginPassword,
    RegisterEmail,
    RegisterPassword,
    RegisterConfirm,
    TaskTitle,
    TaskDescription,
    TaskPriority,
    TaskCategory,
    TaskDue,
    EditTitle { task_id: i64 },
    EditDescription { task_id: i64 },
    EditDue { task_id: i64 },
    CategoryName,
    CategoryRename { category_id: i64 },
}

impl Prompt {
    pub fn question(&self) -> &'static str {
        match self {
            Prompt::Search => "🔎 Send the search text (or «-» to clear it):",
            Prompt::LoginEmail | Prompt::RegisterEmail => "📧 Send your email:",
            Prompt::LoginPassword => "🔑 Send your password:",
            Prompt::RegisterPassword => "🔑 Choose a password (at least 6 characters):",
            Prompt::RegisterConfirm => "🔑 Repeat the password:",
            Prompt::TaskTitle => "📝 Task title?",
            Prompt::TaskDescription => "🗒 Description? Send «-» to skip.",
            Prompt::TaskPriority => {
                "⚖️ Priority? Tap a button or send 1-4 (low, medium, high, urgent). «-» keeps medium."
            }
            Prompt::TaskCategory => "📂 Category? Tap one or send its number. «-» for none.",
            Prompt::TaskDue => "📅 Deadline? Tap a button or send today, tomorrow, +N or DD-MM-YYYY.",
            Prompt::EditTitle { .. } => "✏️ Send the new title:",
            Prompt::EditDescription { .. } => "🗒 Send the new description (or «-» to clear it):",
            Prompt::EditDue { .. } => "📅 Send the new deadline (or «-» to clear it):",
            Prompt::CategoryName => "📂 Name of the new category?",
            Prompt::CategoryRename { .. } => "✏️ New name for the category?",
        }
    }

    /// Passwords are never echoed back into the log.
    fn is_secret(&self) -> bool {
        matches!(
            self,
            Prompt::LoginPassword | Prompt::RegisterPassword | Prompt::RegisterConfirm
        )
    }
}

/// Values collected by the running wizard.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scratch {
    pub email: Option<String>,
    pub password: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub category_id: Option<i64>,
    pub category_page: usize,
}

impl fmt::Debug for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scratch")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("title", &self.title)
            .field("priority", &self.priority)
            .field("category_id", &self.category_id)
            .finish_non_exhaustive()
    }
}

pub fn validate_email(input: &str) -> BotResult<String> {
    let email = input.trim().to_lowercase();
    let ok = EMAIL_RE.as_ref().is_some_and(|re| re.is_match(&email));
    if ok {
        Ok(email)
    } else {
        Err(BotError::invalid("That does not look like an email address."))
    }
}

pub fn validate_password(input: &str) -> BotResult<String> {
    let password = input.trim();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(BotError::invalid(format!(
            "The password needs at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    Ok(password.to_string())
}

pub fn validate_name(input: &str, what: &str) -> BotResult<String> {
    let name = input.trim();
    if name.is_empty() {
        return Err(BotError::invalid(format!("The {what} cannot be empty.")));
    }
    Ok(name.to_string())
}

/// `-` (or blank) means "nothing".
pub fn optional_text(input: &str) -> Option<String> {
    let text = input.trim();
    (!text.is_empty() && text != "-").then(|| text.to_string())
}

pub fn parse_priority_input(input: &str) -> BotResult<Option<Priority>> {
    if optional_text(input).is_none() {
        return Ok(None);
    }
    Priority::parse_alias(input)
        .map(Some)
        .ok_or_else(|| BotError::invalid("Send 1-4 or low, medium, high, urgent."))
}

/// Resolves a 1-based list number (as shown on the buttons) to a category.
pub fn pick_category(input: &str, categories: &[Category]) -> BotResult<Option<i64>> {
    if optional_text(input).is_none() {
        return Ok(None);
    }
    input
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|idx| categories.get(idx))
        .map(|c| Some(c.id))
        .ok_or_else(|| {
            BotError::invalid(format!("Send a number from 1 to {}.", categories.len()))
        })
}

/// `None` means the shortcut asks for manual entry.
pub fn shortcut_date(shortcut: DueShortcut, today: NaiveDate) -> Option<Option<NaiveDate>> {
    match shortcut {
        DueShortcut::Today => Some(Some(today)),
        DueShortcut::Tomorrow => Some(today.checked_add_days(Days::new(1))),
        DueShortcut::InDays(n) => Some(today.checked_add_days(Days::new(u64::from(n)))),
        DueShortcut::NoDeadline => Some(None),
        DueShortcut::Manual => None,
    }
}

fn due_input(input: &str, today: NaiveDate) -> BotResult<Option<NaiveDate>> {
    parse_due(input, today).map_err(|_| BotError::invalid(DUE_HINT))
}

async fn ask(session: &Session, prompt: Prompt, target: RenderTarget) -> BotResult<Vec<Reply>> {
    session.set_prompt(&prompt).await?;
    Ok(vec![Reply::show(target, render::prompt(prompt.question()))])
}

pub async fn start_login(session: &Session) -> BotResult<Vec<Reply>> {
    session.clear_conversation().await?;
    ask(session, Prompt::LoginEmail, RenderTarget::Send).await
}

pub async fn start_register(session: &Session) -> BotResult<Vec<Reply>> {
    session.clear_conversation().await?;
    ask(session, Prompt::RegisterEmail, RenderTarget::Send).await
}

pub async fn start_new_task(session: &Session, target: RenderTarget) -> BotResult<Vec<Reply>> {
    session.clear_conversation().await?;
    ask(session, Prompt::TaskTitle, target).await
}

pub async fn start_new_category(session: &Session, target: RenderTarget) -> BotResult<Vec<Reply>> {
    session.clear_conversation().await?;
    ask(session, Prompt::CategoryName, target).await
}

pub async fn start_rename_category(
    session: &Session,
    category_id: i64,
    target: RenderTarget,
) -> BotResult<Vec<Reply>> {
    session.clear_conversation().await?;
    ask(session, Prompt::CategoryRename { category_id }, target).await
}

/// The screen for a step, optionally headed by a validation hint.
async fn prompt_screen(app: &App, session: &Session, prompt: &Prompt, hint: Option<&str>) -> BotResult<Screen> {
    let text = match hint {
        Some(hint) => format!("⚠️ {hint}\n\n{}", prompt.question()),
        None => prompt.question().to_string(),
    };
    let screen = match prompt {
        Prompt::TaskPriority => Screen::inline(text, render::wizard_priority_keyboard()),
        Prompt::TaskCategory => {
            let categories = app.api.categories().list(session.user_id).await?;
            let scratch = session.scratch().await?;
            Screen::inline(
                text,
                render::wizard_category_keyboard(&categories, scratch.category_page, app.ui.category_page_size),
            )
        }
        Prompt::TaskDue => Screen::inline(text, render::wizard_due_keyboard()),
        _ => render::prompt(text),
    };
    Ok(screen)
}

/// Text received while `prompt` is pending.
#[tracing::instrument(skip(app, session, user, input), fields(user_id = session.user_id))]
pub async fn handle_text(
    app: &App,
    session: &Session,
    user: &ChatUser,
    prompt: Prompt,
    input: &str,
) -> BotResult<Vec<Reply>> {
    if prompt.is_secret() {
        debug!(step = ?prompt, "wizard input (redacted)");
    } else {
        debug!(step = ?prompt, len = input.len(), "wizard input");
    }

    match advance(app, session, user, &prompt, input).await {
        Err(BotError::InvalidInput { hint }) => {
            session.set_prompt(&prompt).await?;
            let screen = prompt_screen(app, session, &prompt, Some(&hint)).await?;
            Ok(vec![Reply::send(screen)])
        }
        other => other,
    }
}

async fn advance(
    app: &App,
    session: &Session,
    user: &ChatUser,
    prompt: &Prompt,
    input: &str,
) -> BotResult<Vec<Reply>> {
    let send = RenderTarget::Send;
    match prompt {
        Prompt::Search => engine::apply_search(app, session, input).await,

        Prompt::LoginEmail => {
            let email = validate_email(input)?;
            let scratch = Scratch {
                email: Some(email),
                ..Scratch::default()
            };
            session.set_scratch(&scratch).await?;
            ask(session, Prompt::LoginPassword, send).await
        }
        Prompt::LoginPassword => {
            let password = validate_password(input)?;
            let scratch = session.scratch().await?;
            let Some(email) = scratch.email else {
                return restart("login", session).await;
            };
            login(app, session, &email, &password).await
        }

        Prompt::RegisterEmail => {
            let email = validate_email(input)?;
            let scratch = Scratch {
                email: Some(email),
                ..Scratch::default()
            };
            session.set_scratch(&scratch).await?;
            ask(session, Prompt::RegisterPassword, send).await
        }
        Prompt::RegisterPassword => {
            let password = validate_password(input)?;
            let mut scratch = session.scratch().await?;
            scratch.password = Some(password);
            session.set_scratch(&scratch).await?;
            ask(session, Prompt::RegisterConfirm, send).await
        }
        Prompt::RegisterConfirm => {
            let scratch = session.scratch().await?;
            let (Some(email), Some(password)) = (scratch.email, scratch.password) else {
                return restart("register", session).await;
            };
            if input.trim() != password {
                return Err(BotError::invalid("The passwords do not match."));
            }
            register(app, session, user, &email, &password).await
        }

        Prompt::TaskTitle => {
            let title = validate_name(input, "title")?;
            let scratch = Scratch {
                title: Some(title),
                ..Scratch::default()
            };
            session.set_scratch(&scratch).await?;
            ask(session, Prompt::TaskDescription, send).await
        }
        Prompt::TaskDescription => {
            let mut scratch = session.scratch().await?;
            scratch.description = optional_text(input);
            session.set_scratch(&scratch).await?;
            session.set_prompt(&Prompt::TaskPriority).await?;
            Ok(vec![Reply::send(
                prompt_screen(app, session, &Prompt::TaskPriority, None).await?,
            )])
        }
        Prompt::TaskPriority => {
            let priority = parse_priority_input(input)?;
            after_priority(app, session, priority, send).await
        }
        Prompt::TaskCategory => {
            let categories = app.api.categories().list(session.user_id).await?;
            let category = pick_category(input, &categories)?;
            after_category(app, session, category, send).await
        }
        Prompt::TaskDue => {
            let due = due_input(input, app.today())?;
            finish_task(app, session, due, send).await
        }

        Prompt::EditTitle { task_id } => {
            let title = validate_name(input, "title")?;
            edit_field(app, session, *task_id, TaskPatch::Title(title)).await
        }
        Prompt::EditDescription { task_id } => {
            edit_field(app, session, *task_id, TaskPatch::Description(optional_text(input))).await
        }
        Prompt::EditDue { task_id } => {
            let due = due_input(input, app.today())?;
            edit_field(app, session, *task_id, TaskPatch::Due(due)).await
        }

        Prompt::CategoryName => {
            let name = validate_name(input, "category name")?;
            app.api.categories().create(session.user_id, &name).await?;
            session.clear_conversation().await?;
            info!("category created");
            Ok(vec![
                Reply::notice("✅ Category created"),
                engine::show_categories(app, session, send).await?,
            ])
        }
        Prompt::CategoryRename { category_id } => {
            let name = validate_name(input, "category name")?;
            app.api
                .categories()
                .rename(session.user_id, *category_id, &name)
                .await?;
            session.clear_conversation().await?;
            Ok(vec![
                Reply::notice("✅ Category renamed"),
                engine::show_categories(app, session, send).await?,
            ])
        }
    }
}

async fn restart(flow: &str, session: &Session) -> BotResult<Vec<Reply>> {
    warn!(flow, "wizard state expired mid-flow");
    session.clear_conversation().await?;
    Ok(vec![Reply::send(Screen::menu(format!(
        "⌛ That took too long. Start again with /{flow}."
    )))])
}

async fn login(app: &App, session: &Session, email: &str, password: &str) -> BotResult<Vec<Reply>> {
    match app.api.auth().login(email, password).await {
        Ok(tokens) => {
            session
                .set_tokens(&tokens.access_token, &tokens.refresh_token)
                .await?;
            session.set_state(UserState::LoggedIn).await?;
            session.clear_conversation().await?;
            info!(user_id = session.user_id, "logged in");
            Ok(vec![Reply::send(Screen::menu(format!(
                "✅ Logged in as {}",
                render::escape_html(email)
            )))])
        }
        Err(BotError::InvalidInput { hint }) => {
            session.clear_conversation().await?;
            Ok(vec![Reply::send(Screen::menu(format!(
                "❌ {}\nUse /login to try again.",
                render::escape_html(&hint)
            )))])
        }
        Err(err) => Err(err),
    }
}

async fn register(
    app: &App,
    session: &Session,
    user: &ChatUser,
    email: &str,
    password: &str,
) -> BotResult<Vec<Reply>> {
    let first = user.first_name.as_deref().unwrap_or_default();
    let last = user.last_name.as_deref().unwrap_or_default();
    let outcome = app.api.auth().register(email, password, first, last).await;
    session.clear_conversation().await?;
    match outcome {
        Ok(()) => {
            info!(user_id = session.user_id, "account registered");
            Ok(vec![Reply::send(Screen::menu(
                "✅ Account created. Use /login to sign in.",
            ))])
        }
        Err(BotError::InvalidInput { hint }) => Ok(vec![Reply::send(Screen::menu(format!(
            "❌ {}\nUse /register to try again.",
            render::escape_html(&hint)
        )))]),
        Err(err) => Err(err),
    }
}

async fn after_priority(
    app: &App,
    session: &Session,
    priority: Option<Priority>,
    target: RenderTarget,
) -> BotResult<Vec<Reply>> {
    let mut scratch = session.scratch().await?;
    scratch.priority = Some(priority.unwrap_or_default());
    scratch.category_page = 0;
    session.set_scratch(&scratch).await?;

    let categories = app.api.categories().list(session.user_id).await?;
    let step = if categories.is_empty() {
        Prompt::TaskDue
    } else {
        Prompt::TaskCategory
    };
    session.set_prompt(&step).await?;
    let screen = prompt_screen(app, session, &step, None).await?;
    Ok(vec![Reply::show(target, screen)])
}

async fn after_category(
    app: &App,
    session: &Session,
    category: Option<i64>,
    target: RenderTarget,
) -> BotResult<Vec<Reply>> {
    let mut scratch = session.scratch().await?;
    scratch.category_id = category;
    session.set_scratch(&scratch).await?;
    session.set_prompt(&Prompt::TaskDue).await?;
    let screen = prompt_screen(app, session, &Prompt::TaskDue, None).await?;
    Ok(vec![Reply::show(target, screen)])
}

async fn finish_task(
    app: &App,
    session: &Session,
    due: Option<NaiveDate>,
    target: RenderTarget,
) -> BotResult<Vec<Reply>> {
    let scratch = session.scratch().await?;
    let Some(title) = scratch.title else {
        return restart("newtask", session).await;
    };
    let task = NewTask {
        title,
        description: scratch.description,
        priority: scratch.priority.unwrap_or_default(),
        category_id: scratch.category_id,
        due_date: due.map(format_api_date),
    };
    let created = app.api.tasks().create(session.user_id, &task).await?;
    session.clear_conversation().await?;
    info!(task_id = ?created.as_ref().map(|t| t.id), "task created");

    Ok(vec![
        Reply::notice("✅ Task created"),
        engine::show_list(app, session, target).await?,
    ])
}

async fn edit_field(app: &App, session: &Session, task_id: i64, patch: TaskPatch) -> BotResult<Vec<Reply>> {
    match app.api.tasks().update(session.user_id, task_id, &patch).await {
        Ok(task) => {
            session.clear_prompt().await?;
            Ok(vec![Reply::send(render::task_card(&task))])
        }
        Err(BotError::NotFound) => {
            session.clear_prompt().await?;
            Ok(vec![Reply::send(render::task_missing())])
        }
        // The prompt stays pending so the next message retries.
        Err(err) => Err(err),
    }
}

pub fn is_wizard_action(action: &Action) -> bool {
    matches!(
        action,
        Action::WizardPriority(_)
            | Action::WizardCategoryPage(_)
            | Action::WizardCategory(_)
            | Action::WizardDue(_)
    )
}

/// Buttons attached to the task creation steps. A button from a step that is
/// no longer pending is answered with a notice.
#[tracing::instrument(skip(app, session), fields(user_id = session.user_id))]
pub async fn handle_button(app: &App, session: &Session, action: &Action) -> BotResult<Vec<Reply>> {
    let prompt = session.prompt().await?;
    let edit = RenderTarget::Edit;
    match (prompt, action) {
        (Some(Prompt::TaskPriority), Action::WizardPriority(priority)) => {
            after_priority(app, session, *priority, edit).await
        }
        (Some(Prompt::TaskCategory), Action::WizardCategoryPage(page)) => {
            let mut scratch = session.scratch().await?;
            scratch.category_page = *page;
            session.set_scratch(&scratch).await?;
            let screen = prompt_screen(app, session, &Prompt::TaskCategory, None).await?;
            Ok(vec![Reply::edit(screen)])
        }
        (Some(Prompt::TaskCategory), Action::WizardCategory(category)) => {
            after_category(app, session, *category, edit).await
        }
        (Some(Prompt::TaskDue), Action::WizardDue(shortcut)) => match shortcut_date(*shortcut, app.today()) {
            Some(due) => finish_task(app, session, due, edit).await,
            None => Ok(vec![Reply::edit(render::prompt(Prompt::TaskDue.question()))]),
        },
        (pending, _) => {
            debug!(?pending, action = %action, "stale wizard button");
            Ok(vec![Reply::alert("This step has expired. Start again with /newtask.")])
        }
    }
}
