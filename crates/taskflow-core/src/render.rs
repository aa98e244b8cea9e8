use std::collections::BTreeSet;

use chrono::NaiveDate;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::action::{Action, DueShortcut};
use crate::datetime::format_due;
use crate::grouping::{Groups, group_tasks};
use crate::profile::{SortField, ViewMode, ViewProfile};
use crate::task::{Category, Priority, Status, Task, TaskPage};
use crate::view::{Button, Keyboard, Screen};

pub const TITLE_WIDTH: usize = 34;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Collapses whitespace and cuts to `max` display columns, ending with `…`.
pub fn shorten(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if UnicodeWidthStr::width(collapsed.as_str()) <= max {
        return collapsed;
    }

    let budget = max.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0usize;
    for ch in collapsed.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    let mut out = out.trim_end().to_string();
    out.push('…');
    out
}

fn page_slice<T>(items: &[T], page: usize, size: usize) -> (&[T], bool, bool) {
    let size = size.max(1);
    let start = page.saturating_mul(size).min(items.len());
    let end = (start + size).min(items.len());
    (&items[start..end], page > 0, end < items.len())
}

fn check(on: bool) -> &'static str {
    if on { "☑️" } else { "⬜️" }
}

pub fn header_strip(profile: &ViewProfile, total: usize) -> String {
    let mut chips: Vec<String> = Vec::new();
    chips.push(match profile.view_mode {
        ViewMode::Active => "📋 Active".to_string(),
        ViewMode::Archived => "📦 Archive".to_string(),
    });
    chips.push(format!(
        "⇅ {}{}",
        profile.sort_field.label(),
        profile.sort_direction.arrow()
    ));
    chips.push(format!(
        "{}/{} · {}",
        profile.page_number(),
        profile.page_count(total),
        total
    ));

    if profile.overdue_only == Some(true) {
        chips.push("⏰ Overdue".to_string());
    }
    if profile.due_range.is_some() {
        chips.push("🎯 Range".to_string());
    }
    if !profile.priorities.is_empty() {
        let letters: Vec<String> = profile
            .priorities
            .iter()
            .map(|p| p.initial().to_string())
            .collect();
        chips.push(format!("⚡ {}", letters.join(",")));
    }
    if profile.view_mode == ViewMode::Active && !profile.statuses.is_empty() {
        let icons: String = profile.statuses.iter().map(|s| s.icon()).collect();
        chips.push(icons);
    }
    if profile.has_search() {
        chips.push("🔎".to_string());
    }

    chips.join(" · ")
}

pub fn summary(groups: &Groups) -> String {
    groups
        .iter()
        .map(|g| format!("{} — {}", g.bucket.label(), g.tasks.len()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn control_row(profile: &ViewProfile) -> Vec<Button> {
    let filters = if profile.filters_active() { "🎛*" } else { "🎛" };
    let search = if profile.has_search() { "🔎*" } else { "🔎" };
    let view = match profile.view_mode {
        ViewMode::Active => "📦",
        ViewMode::Archived => "📋",
    };
    vec![
        Button::new(filters, Action::OpenFilters),
        Button::new(view, Action::ToggleView),
        Button::new("⇅", Action::OpenSort),
        Button::new(search, Action::Search),
        Button::new("➕", Action::NewTask),
    ]
}

fn nav_row(has_prev: bool, has_next: bool) -> Vec<Button> {
    let mut row = Vec::new();
    if has_prev {
        row.push(Button::new("⬅️", Action::PagePrev));
    }
    row.push(Button::new("🔄", Action::Refresh));
    if has_next {
        row.push(Button::new("➡️", Action::PageNext));
    }
    row
}

pub fn list_keyboard(
    profile: &ViewProfile,
    groups: &Groups,
    has_prev: bool,
    has_next: bool,
    group_page_size: usize,
) -> Keyboard {
    let mut kb = Keyboard::new();
    for group in groups.iter() {
        kb.push_row(vec![Button::new(
            format!("{} ({})", group.bucket.label(), group.tasks.len()),
            Action::GroupPreset(group.bucket),
        )]);
        let window = group.window(profile.cursor(group.bucket), group_page_size);
        for task in window.items {
            kb.push_row(vec![Button::new(
                format!("• {}", shorten(task.display_title(), TITLE_WIDTH)),
                Action::OpenTask(task.id),
            )]);
        }
        if window.has_more {
            kb.push_row(vec![Button::new("More…", Action::GroupMore(group.bucket))]);
        }
    }
    kb.push_row(control_row(profile));
    kb.push_row(nav_row(has_prev, has_next));
    kb
}

#[tracing::instrument(skip_all, fields(total = page.total, fetched = page.tasks.len()))]
pub fn list_screen(
    profile: &ViewProfile,
    page: &TaskPage,
    today: NaiveDate,
    group_page_size: usize,
) -> Screen {
    let groups = group_tasks(&page.tasks, today);
    let has_prev = profile.has_prev();
    let has_next = profile.has_next(page.tasks.len(), page.total);

    let mut text = format!("🗂 <b>Tasks</b>\n{}\n\n", header_strip(profile, page.total));
    if groups.is_empty() {
        text.push_str("Nothing matches the current filters.");
    } else {
        text.push_str(&summary(&groups));
        text.push_str("\n\nTap a task to open it, or a group to filter by it.");
    }

    let kb = list_keyboard(profile, &groups, has_prev, has_next, group_page_size);
    Screen::inline(text, kb)
}

/// Fallback list view when the fetch failed; paging controls are hidden.
pub fn list_error_screen(profile: &ViewProfile) -> Screen {
    let kb = Keyboard::new()
        .row(control_row(profile))
        .row(nav_row(false, false));
    Screen::inline("❌ Could not load the task list.", kb)
}

pub fn filters_menu(profile: &ViewProfile) -> Screen {
    let urgent = profile.priorities == crate::profile::urgent_priorities();
    let kb = Keyboard::new()
        .row(vec![
            Button::new(format!("{} 🔥 Urgent", check(urgent)), Action::QuickUrgent),
            Button::new(
                format!("{} ⏰ Overdue", check(profile.overdue_only == Some(true))),
                Action::QuickOverdue,
            ),
            Button::new(
                format!("{} 🎯 Today", check(profile.due_range.is_some())),
                Action::QuickToday,
            ),
        ])
        .row(vec![
            Button::new("⚡ Priority", Action::OpenPriorities),
            Button::new("📌 Status", Action::OpenStatuses),
            Button::new("🗂 Category", Action::OpenCategoryFilter),
        ])
        .row(vec![
            Button::new("🧹 Reset", Action::Reset),
            Button::new("↩️ Back", Action::BackToList),
        ]);
    Screen::inline("🎛 <b>Filters</b>", kb)
}

pub fn priority_selector(draft: &BTreeSet<Priority>) -> Screen {
    let toggle = |p: Priority| {
        Button::new(
            format!("{} {}", check(draft.contains(&p)), p.label()),
            Action::PriorityToggle {
                draft: draft.clone(),
                value: p,
            },
        )
    };
    let kb = Keyboard::new()
        .row(vec![toggle(Priority::Low), toggle(Priority::Medium)])
        .row(vec![toggle(Priority::High), toggle(Priority::Urgent)])
        .row(vec![
            Button::new("Apply", Action::PriorityApply(draft.clone())),
            Button::new("Clear", Action::PriorityClear),
            Button::new("↩️ Back", Action::BackToList),
        ]);
    Screen::inline("Pick one or more priorities:", kb)
}

pub fn status_selector(draft: &BTreeSet<Status>) -> Screen {
    let toggle = |s: Status| {
        Button::new(
            format!("{} {}", check(draft.contains(&s)), s.label()),
            Action::StatusToggle {
                draft: draft.clone(),
                value: s,
            },
        )
    };
    let kb = Keyboard::new()
        .row(vec![toggle(Status::Todo), toggle(Status::InProgress)])
        .row(vec![toggle(Status::Done), toggle(Status::Archived)])
        .row(vec![
            Button::new("Apply", Action::StatusApply(draft.clone())),
            Button::new("Clear", Action::StatusClear),
            Button::new("↩️ Back", Action::BackToList),
        ]);
    Screen::inline("Pick one or more statuses:", kb)
}

pub fn sort_selector(profile: &ViewProfile) -> Screen {
    let item = |field: SortField| {
        if profile.sort_field == field {
            Button::new(
                format!("{} {}", field.label(), profile.sort_direction.arrow()),
                Action::SortToggleDirection,
            )
        } else {
            Button::new(field.label(), Action::SortSet(field))
        }
    };
    let kb = Keyboard::new()
        .row(vec![item(SortField::DueDate), item(SortField::Priority)])
        .row(vec![item(SortField::UpdatedAt), item(SortField::Title)])
        .row(vec![Button::new("↩️ Back", Action::BackToList)]);
    Screen::inline("Sort by (tap the active field to flip direction):", kb)
}

pub fn category_filter_selector(
    categories: &[Category],
    selected: Option<i64>,
    page: usize,
    page_size: usize,
) -> Screen {
    let (items, has_prev, has_next) = page_slice(categories, page, page_size);
    let mut kb = Keyboard::new();
    for c in items {
        let mark = if selected == Some(c.id) { "✔️ " } else { "" };
        kb.push_row(vec![Button::new(
            format!("{mark}{}", c.name),
            Action::CategoryFilterSet(c.id),
        )]);
    }
    let mut nav = Vec::new();
    if has_prev {
        nav.push(Button::new("⬅️ Prev", Action::CategoryFilterPage(page - 1)));
    }
    if has_next {
        nav.push(Button::new("➡️ Next", Action::CategoryFilterPage(page + 1)));
    }
    kb.push_row(nav);
    kb.push_row(vec![
        Button::new("Any category", Action::CategoryFilterNone),
        Button::new("↩️ Back", Action::BackToList),
    ]);

    let text = if categories.is_empty() {
        "You have no categories yet."
    } else {
        "Pick a category:"
    };
    Screen::inline(text, kb)
}

pub fn search_prompt() -> Screen {
    Screen::inline(
        "🔎 Send the search text (or «-» to clear it):",
        Keyboard::new().row(vec![Button::new("↩️ Back", Action::BackToList)]),
    )
}

pub fn task_text(task: &Task) -> String {
    let category = task
        .category
        .as_ref()
        .map(|c| escape_html(&c.name))
        .unwrap_or_else(|| "—".to_string());
    let mut text = format!(
        "📝 <b>{}</b>\nStatus: {}  •  Priority: {}\nCategory: {}",
        escape_html(task.display_title()),
        task.status.label(),
        task.priority.label(),
        category
    );
    if let Some(due) = task.due_date {
        text.push_str(&format!("\nDeadline: {}", format_due(due)));
    }
    if let Some(desc) = task.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        text.push_str(&format!("\n\n{}", escape_html(desc)));
    }
    text
}

pub fn task_card(task: &Task) -> Screen {
    let mut first = Vec::new();
    if task.status == Status::Done {
        first.push(Button::new("↩️ Reopen", Action::TaskReopen(task.id)));
    } else if !task.is_archived() {
        first.push(Button::new("✅ Done", Action::TaskDone(task.id)));
    }
    first.push(Button::new("✏️ Edit", Action::EditMenu(task.id)));

    let archive = if task.is_archived() {
        Button::new("♻️ Restore", Action::TaskRestore(task.id))
    } else {
        Button::new("📦 Archive", Action::TaskArchive(task.id))
    };

    let kb = Keyboard::new()
        .row(first)
        .row(vec![archive, Button::new("🗑 Delete", Action::TaskDelete(task.id))])
        .row(vec![Button::new("📋 Back to list", Action::BackToList)]);
    Screen::inline(task_text(task), kb)
}

pub fn task_edit_menu(task: &Task) -> Screen {
    let due = task
        .due_date
        .map(|d| format!(": {}", format_due(d)))
        .unwrap_or_default();
    let category = task
        .category
        .as_ref()
        .map(|c| format!(": {}", shorten(&c.name, 16)))
        .unwrap_or_default();
    let kb = Keyboard::new()
        .row(vec![
            Button::new("📝 Title", Action::EditTitle(task.id)),
            Button::new("✍️ Description", Action::EditDescription(task.id)),
        ])
        .row(vec![
            Button::new(format!("⚡ {}", task.priority.label()), Action::EditPriority(task.id)),
            Button::new(format!("⏰ Deadline{due}"), Action::EditDue(task.id)),
        ])
        .row(vec![Button::new(
            format!("📁 Category{category}"),
            Action::EditCategory {
                task: task.id,
                page: 0,
            },
        )])
        .row(vec![
            Button::new("⬅️ To task", Action::OpenTask(task.id)),
            Button::new("📋 To list", Action::BackToList),
        ]);
    Screen::inline(
        format!("✏️ Editing <b>{}</b>", escape_html(task.display_title())),
        kb,
    )
}

fn priority_rows(make: impl Fn(Priority) -> Action) -> Vec<Vec<Button>> {
    let button = |idx: usize, p: Priority| Button::new(format!("{} {}", idx + 1, p.label()), make(p));
    vec![
        vec![button(0, Priority::Low), button(1, Priority::Medium)],
        vec![button(2, Priority::High), button(3, Priority::Urgent)],
    ]
}

pub fn task_priority_picker(task_id: i64) -> Screen {
    let mut kb = Keyboard {
        rows: priority_rows(|priority| Action::SetTaskPriority {
            task: task_id,
            priority,
        }),
    };
    kb.push_row(vec![Button::new("↩️ Back", Action::EditMenu(task_id))]);
    Screen::inline("Choose a priority:", kb)
}

pub fn task_due_picker(task_id: i64) -> Screen {
    let due = |label: &str, choice: DueShortcut| {
        Button::new(
            label,
            Action::SetTaskDue {
                task: task_id,
                due: choice,
            },
        )
    };
    let kb = Keyboard::new()
        .row(vec![
            due("Today", DueShortcut::Today),
            due("Tomorrow", DueShortcut::Tomorrow),
            due("+3 days", DueShortcut::InDays(3)),
        ])
        .row(vec![
            due("No deadline", DueShortcut::NoDeadline),
            due("🗓 Enter date", DueShortcut::Manual),
        ])
        .row(vec![Button::new("↩️ Back", Action::EditMenu(task_id))]);
    Screen::inline("Choose a deadline:", kb)
}

pub fn task_category_picker(
    task_id: i64,
    categories: &[Category],
    page: usize,
    page_size: usize,
) -> Screen {
    let (items, has_prev, has_next) = page_slice(categories, page, page_size);
    let mut kb = Keyboard::new();
    for c in items {
        kb.push_row(vec![Button::new(
            c.name.clone(),
            Action::SetTaskCategory {
                task: task_id,
                category: Some(c.id),
            },
        )]);
    }
    let mut nav = Vec::new();
    if has_prev {
        nav.push(Button::new(
            "⬅️ Prev",
            Action::EditCategory {
                task: task_id,
                page: page - 1,
            },
        ));
    }
    if has_next {
        nav.push(Button::new(
            "➡️ Next",
            Action::EditCategory {
                task: task_id,
                page: page + 1,
            },
        ));
    }
    kb.push_row(nav);
    kb.push_row(vec![
        Button::new(
            "No category",
            Action::SetTaskCategory {
                task: task_id,
                category: None,
            },
        ),
        Button::new("↩️ Back", Action::EditMenu(task_id)),
    ]);
    Screen::inline("Choose a category:", kb)
}

pub fn task_missing() -> Screen {
    Screen::inline(
        "❌ Task not found. It may have been deleted.",
        Keyboard::new().row(vec![Button::new("📋 Back to list", Action::BackToList)]),
    )
}

pub fn task_deleted() -> Screen {
    Screen::inline(
        "🗑 Task deleted.",
        Keyboard::new().row(vec![Button::new("📋 Back to list", Action::BackToList)]),
    )
}

fn cancel_row() -> Vec<Button> {
    vec![Button::new("❌ Cancel", Action::Cancel)]
}

pub fn wizard_priority_keyboard() -> Keyboard {
    let mut kb = Keyboard {
        rows: priority_rows(|p| Action::WizardPriority(Some(p))),
    };
    kb.push_row(vec![
        Button::new("Skip", Action::WizardPriority(None)),
        Button::new("❌ Cancel", Action::Cancel),
    ]);
    kb
}

pub fn wizard_category_keyboard(categories: &[Category], page: usize, page_size: usize) -> Keyboard {
    let (items, has_prev, has_next) = page_slice(categories, page, page_size);
    let mut kb = Keyboard::new();
    for (idx, c) in items.iter().enumerate() {
        let number = page * page_size.max(1) + idx + 1;
        kb.push_row(vec![Button::new(
            format!("{number}. {}", c.name),
            Action::WizardCategory(Some(c.id)),
        )]);
    }
    let mut nav = Vec::new();
    if has_prev {
        nav.push(Button::new("⬅️ Prev", Action::WizardCategoryPage(page - 1)));
    }
    if has_next {
        nav.push(Button::new("➡️ Next", Action::WizardCategoryPage(page + 1)));
    }
    kb.push_row(nav);
    kb.push_row(vec![
        Button::new("No category", Action::WizardCategory(None)),
        Button::new("❌ Cancel", Action::Cancel),
    ]);
    kb
}

pub fn wizard_due_keyboard() -> Keyboard {
    Keyboard::new()
        .row(vec![
            Button::new("Today", Action::WizardDue(DueShortcut::Today)),
            Button::new("Tomorrow", Action::WizardDue(DueShortcut::Tomorrow)),
        ])
        .row(vec![
            Button::new("+3 days", Action::WizardDue(DueShortcut::InDays(3))),
            Button::new("+7 days", Action::WizardDue(DueShortcut::InDays(7))),
        ])
        .row(vec![Button::new("No deadline", Action::WizardDue(DueShortcut::NoDeadline))])
        .row(cancel_row())
}

pub fn prompt(text: impl Into<String>) -> Screen {
    Screen::inline(text, Keyboard::new().row(cancel_row()))
}

pub fn categories_screen(categories: &[Category]) -> Screen {
    let mut kb = Keyboard::new();
    let text = if categories.is_empty() {
        "📂 <b>Categories</b>\n\nNo categories yet.".to_string()
    } else {
        let lines: Vec<String> = categories
            .iter()
            .enumerate()
            .map(|(idx, c)| format!("{}. {}", idx + 1, escape_html(&c.name)))
            .collect();
        format!("📂 <b>Categories</b>\n\n{}", lines.join("\n"))
    };
    for c in categories {
        kb.push_row(vec![
            Button::new(format!("📋 {}", shorten(&c.name, 20)), Action::CategoryTasks(c.id)),
            Button::new("✏️", Action::CategoryRename(c.id)),
            Button::new("🗑", Action::CategoryDelete(c.id)),
        ]);
    }
    kb.push_row(vec![Button::new("➕ New category", Action::NewCategory)]);
    Screen::inline(text, kb)
}

pub const HELP_TEXT: &str = "<b>TaskFlow</b>\n\n\
/tasks - browse your tasks\n\
/newtask - create a task\n\
/categories - manage categories\n\
/newcategory - create a category\n\
/login, /register, /logout - account\n\
/me - who am I\n\
/status - session state\n\
/cancel - abort the current step";
