use crate::action::Action;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    pub fn push_row(&mut self, row: Vec<Button>) {
        if !row.is_empty() {
            self.rows.push(row);
        }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    pub fn contains(&self, action: &Action) -> bool {
        self.buttons().any(|b| &b.action == action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    None,
    Inline(Keyboard),
    /// Persistent reply keyboard with the main menu entries.
    MainMenu,
}

/// HTML text plus controls. User content in `text` is already escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub text: String,
    pub markup: Markup,
}

impl Screen {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::None,
        }
    }

    pub fn inline(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            markup: Markup::Inline(keyboard),
        }
    }

    pub fn menu(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::MainMenu,
        }
    }

    pub fn keyboard(&self) -> Option<&Keyboard> {
        match &self.markup {
            Markup::Inline(kb) => Some(kb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// New message in the chat.
    Send,
    /// Replace the message the pressed button belongs to.
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Show { target: RenderTarget, screen: Screen },
    /// Short popup answer to a button press (or a plain message for text input).
    Notice { text: String, alert: bool },
}

impl Reply {
    pub fn send(screen: Screen) -> Self {
        Reply::Show {
            target: RenderTarget::Send,
            screen,
        }
    }

    pub fn edit(screen: Screen) -> Self {
        Reply::Show {
            target: RenderTarget::Edit,
            screen,
        }
    }

    pub fn show(target: RenderTarget, screen: Screen) -> Self {
        Reply::Show { target, screen }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Reply::Notice {
            text: text.into(),
            alert: false,
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Reply::Notice {
            text: text.into(),
            alert: true,
        }
    }

    pub fn screen(&self) -> Option<&Screen> {
        match self {
            Reply::Show { screen, .. } => Some(screen),
            Reply::Notice { .. } => None,
        }
    }
}

pub const MENU_TASKS: &str = "📋 My tasks";
pub const MENU_CATEGORIES: &str = "📂 Categories";
pub const MENU_NEW_TASK: &str = "➕ Task";
pub const MENU_NEW_CATEGORY: &str = "➕ Category";
pub const MENU_HELP: &str = "❓ Help";
pub const MENU_PROFILE: &str = "⚙️ Profile";
pub const MENU_REFRESH: &str = "🔄 Refresh";

/// Main menu layout, row by row.
pub const MAIN_MENU: [&[&str]; 3] = [
    &[MENU_TASKS, MENU_CATEGORIES],
    &[MENU_NEW_TASK, MENU_NEW_CATEGORY],
    &[MENU_HELP, MENU_PROFILE, MENU_REFRESH],
];
