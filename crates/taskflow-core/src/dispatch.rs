use tracing::{debug, info, warn};

use crate::action::Action;
use crate::app::{App, ChatUser};
use crate::engine;
use crate::error::{BotError, BotResult};
use crate::render::{self, HELP_TEXT};
use crate::session::{Session, UserState};
use crate::view::{
    MENU_CATEGORIES, MENU_HELP, MENU_NEW_CATEGORY, MENU_NEW_TASK, MENU_PROFILE, MENU_REFRESH,
    MENU_TASKS, RenderTarget, Reply, Screen,
};
use crate::wizard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
    Login,
    Register,
    Logout,
    Me,
    Status,
    Tasks,
    NewTask,
    Categories,
    NewCategory,
}

impl Command {
    pub fn parse(name: &str) -> Option<Self> {
        let cmd = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "cancel" => Command::Cancel,
            "login" => Command::Login,
            "register" => Command::Register,
            "logout" => Command::Logout,
            "me" => Command::Me,
            "status" => Command::Status,
            "tasks" => Command::Tasks,
            "newtask" => Command::NewTask,
            "categories" => Command::Categories,
            "newcategory" => Command::NewCategory,
            _ => return None,
        };
        Some(cmd)
    }

    fn from_menu(text: &str) -> Option<Self> {
        let cmd = match text {
            MENU_TASKS | MENU_REFRESH => Command::Tasks,
            MENU_CATEGORIES => Command::Categories,
            MENU_NEW_TASK => Command::NewTask,
            MENU_NEW_CATEGORY => Command::NewCategory,
            MENU_HELP => Command::Help,
            MENU_PROFILE => Command::Me,
            "Cancel" | "❌ Cancel" => Command::Cancel,
            _ => return None,
        };
        Some(cmd)
    }

    fn needs_auth(self) -> bool {
        matches!(
            self,
            Command::Me | Command::Tasks | Command::NewTask | Command::Categories | Command::NewCategory
        )
    }
}

/// One update from the chat transport, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    UnknownCommand(String),
    Text(String),
    Button(Action),
    /// A button token that no longer decodes.
    StaleButton(String),
}

impl Inbound {
    /// Slash commands (with an optional `@botname` suffix) and main-menu
    /// labels become commands; everything else is free text.
    pub fn from_text(raw: &str) -> Self {
        let text = raw.trim();
        if let Some(rest) = text.strip_prefix('/') {
            let word = rest.split_whitespace().next().unwrap_or_default();
            let name = word.split('@').next().unwrap_or_default();
            return match Command::parse(name) {
                Some(cmd) => Inbound::Command(cmd),
                None => Inbound::UnknownCommand(name.to_string()),
            };
        }
        match Command::from_menu(text) {
            Some(cmd) => Inbound::Command(cmd),
            None => Inbound::Text(text.to_string()),
        }
    }

    pub fn from_callback(data: &str) -> Self {
        match data.parse::<Action>() {
            Ok(action) => Inbound::Button(action),
            Err(_) => Inbound::StaleButton(data.to_string()),
        }
    }

    fn is_button(&self) -> bool {
        matches!(self, Inbound::Button(_) | Inbound::StaleButton(_))
    }
}

/// Routes one update. User-facing failures come back as replies; anything
/// else is returned for the transport to log.
#[tracing::instrument(skip(app, user, inbound), fields(user_id = user.id))]
pub async fn dispatch(app: &App, user: &ChatUser, inbound: Inbound) -> BotResult<Vec<Reply>> {
    let session = app.session(user.id);
    match route(app, &session, user, &inbound).await {
        Err(err) if err.is_user_facing() => {
            if matches!(err, BotError::AuthRequired) {
                session.clear_tokens().await?;
            }
            info!(error = %err, "answering with a notice");
            Ok(vec![error_reply(&inbound, &err)])
        }
        other => other,
    }
}

fn error_reply(inbound: &Inbound, err: &BotError) -> Reply {
    let text = err.user_message();
    if inbound.is_button() {
        Reply::alert(text)
    } else if matches!(err, BotError::AuthRequired) {
        Reply::send(Screen::menu(text))
    } else {
        Reply::send(Screen::plain(text))
    }
}

async fn require_auth(session: &Session) -> BotResult<()> {
    if session.is_authenticated().await? {
        Ok(())
    } else {
        Err(BotError::AuthRequired)
    }
}

async fn route(app: &App, session: &Session, user: &ChatUser, inbound: &Inbound) -> BotResult<Vec<Reply>> {
    match inbound {
        Inbound::Command(Command::Cancel) => cancel(session, RenderTarget::Send).await,
        Inbound::Command(cmd) => {
            session.clear_conversation().await?;
            if cmd.needs_auth() {
                require_auth(session).await?;
            }
            command(app, session, *cmd).await
        }
        Inbound::UnknownCommand(name) => {
            debug!(command = %name, "unknown command");
            Ok(vec![Reply::send(Screen::plain("Unknown command. See /help."))])
        }
        Inbound::Text(text) => match session.prompt().await? {
            Some(prompt) => wizard::handle_text(app, session, user, prompt, text).await,
            None => Ok(vec![Reply::send(Screen::menu(
                "I didn't catch that. Use the menu below or /help.",
            ))]),
        },
        Inbound::Button(action) => button(app, session, action).await,
        Inbound::StaleButton(token) => {
            warn!(token = %token, "undecodable button token");
            Ok(vec![Reply::alert("This button is no longer valid.")])
        }
    }
}

async fn cancel(session: &Session, target: RenderTarget) -> BotResult<Vec<Reply>> {
    session.clear_conversation().await?;
    let reply = match target {
        RenderTarget::Send => Reply::send(Screen::menu("❌ Cancelled.")),
        RenderTarget::Edit => Reply::edit(Screen::plain("❌ Cancelled.")),
    };
    Ok(vec![reply])
}

async fn command(app: &App, session: &Session, cmd: Command) -> BotResult<Vec<Reply>> {
    let send = RenderTarget::Send;
    match cmd {
        Command::Start => {
            if session.state().await?.is_none() {
                session.set_state(UserState::Started).await?;
            }
            let hint = if session.is_authenticated().await? {
                "Pick an option from the menu below."
            } else {
                "Use /login to sign in or /register to create an account."
            };
            Ok(vec![Reply::send(Screen::menu(format!(
                "👋 Welcome to <b>TaskFlow</b>!\n{hint}"
            )))])
        }
        Command::Help => Ok(vec![Reply::send(Screen::menu(HELP_TEXT))]),
        Command::Cancel => cancel(session, send).await,
        Command::Login => wizard::start_login(session).await,
        Command::Register => wizard::start_register(session).await,
        Command::Logout => logout(app, session).await,
        Command::Me => {
            let account = app.api.auth().me(session.user_id).await?;
            let name = [account.first_name.as_deref(), account.last_name.as_deref()]
                .into_iter()
                .flatten()
                .filter(|part| !part.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            let mut text = format!("👤 <b>{}</b>", render::escape_html(&account.email));
            if !name.is_empty() {
                text.push_str(&format!("\n{}", render::escape_html(&name)));
            }
            Ok(vec![Reply::send(Screen::menu(text))])
        }
        Command::Status => {
            let state = session.state().await?;
            let authed = session.is_authenticated().await?;
            let text = format!(
                "State: {}\nAuthenticated: {}",
                state.map_or("unknown", UserState::as_str),
                if authed { "yes" } else { "no" }
            );
            Ok(vec![Reply::send(Screen::menu(text))])
        }
        Command::Tasks => Ok(vec![engine::show_list(app, session, send).await?]),
        Command::NewTask => wizard::start_new_task(session, send).await,
        Command::Categories => Ok(vec![engine::show_categories(app, session, send).await?]),
        Command::NewCategory => wizard::start_new_category(session, send).await,
    }
}

#[tracing::instrument(skip_all, fields(user_id = session.user_id))]
async fn logout(app: &App, session: &Session) -> BotResult<Vec<Reply>> {
    if session.is_authenticated().await? {
        if let Err(err) = app.api.auth().logout(session.user_id).await {
            warn!(error = %err, "logout call failed, clearing session anyway");
        }
    }
    session.clear_tokens().await?;
    session.clear_profile().await?;
    session.set_state(UserState::LoggedOut).await?;
    info!("logged out");
    Ok(vec![Reply::send(Screen::menu("👋 Logged out."))])
}

async fn button(app: &App, session: &Session, action: &Action) -> BotResult<Vec<Reply>> {
    if action.leaves_prompt() && session.prompt().await?.is_some() {
        debug!(action = %action, "button press leaves the pending prompt");
        session.clear_conversation().await?;
    }

    match action {
        Action::Cancel => return cancel(session, RenderTarget::Edit).await,
        Action::Noop => return Ok(vec![]),
        _ => {}
    }
    require_auth(session).await?;

    let edit = RenderTarget::Edit;
    if wizard::is_wizard_action(action) {
        return wizard::handle_button(app, session, action).await;
    }
    if engine::is_list_action(action) {
        return engine::handle_list_action(app, session, action).await;
    }
    if engine::is_task_action(action) {
        return engine::handle_task_action(app, session, action).await;
    }
    match action {
        Action::NewTask => wizard::start_new_task(session, RenderTarget::Send).await,
        Action::Categories => Ok(vec![engine::show_categories(app, session, edit).await?]),
        Action::NewCategory => wizard::start_new_category(session, edit).await,
        Action::CategoryRename(id) => wizard::start_rename_category(session, *id, edit).await,
        Action::CategoryDelete(id) => engine::delete_category(app, session, *id).await,
        other => {
            warn!(action = %other, "unrouted action");
            Ok(vec![Reply::alert("This button is no longer valid.")])
        }
    }
}
