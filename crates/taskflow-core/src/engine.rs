use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::action::Action;
use crate::api::TaskPatch;
use crate::app::App;
use crate::error::{BotError, BotResult};
use crate::profile::ViewProfile;
use crate::query::to_query_params;
use crate::render;
use crate::session::Session;
use crate::task::{Status, TaskPage};
use crate::view::{RenderTarget, Reply, Screen};
use crate::wizard::{self, Prompt};

/// What a list action resolves to before anything is rendered.
enum Step {
    /// Re-render the stored profile.
    Reload,
    /// Fetch with the mutated profile and persist it only if the fetch succeeds.
    Commit,
    /// Like `Commit`, but a page past the last one is refused with a notice.
    NextPage,
    /// Draw a screen without touching the profile.
    Show(Screen),
    /// Persist the mutated profile and draw a screen; no fetch involved.
    Store(Screen),
    Notice(&'static str),
}

pub async fn fetch_page(app: &App, user_id: i64, profile: &ViewProfile) -> BotResult<TaskPage> {
    let params = to_query_params(profile);
    debug!(user_id, params = params.len(), "fetching task page");
    app.api.tasks().list(user_id, &params).await
}

/// Renders whatever profile is stored for the user.
#[tracing::instrument(skip(app, session), fields(user_id = session.user_id))]
pub async fn show_list(app: &App, session: &Session, target: RenderTarget) -> BotResult<Reply> {
    let profile = session.profile().await?;
    match fetch_page(app, session.user_id, &profile).await {
        Ok(page) => Ok(Reply::show(target, list_screen(app, &profile, &page))),
        Err(err) => failed_list(&profile, err, target),
    }
}

/// Fetches with `next`; on success `next` becomes the stored profile, on a
/// remote failure `current` stays stored and the error screen is drawn from it.
pub async fn commit_and_show(
    app: &App,
    session: &Session,
    current: &ViewProfile,
    next: ViewProfile,
    target: RenderTarget,
) -> BotResult<Reply> {
    match fetch_page(app, session.user_id, &next).await {
        Ok(page) => {
            session.save_profile(&next).await?;
            Ok(Reply::show(target, list_screen(app, &next, &page)))
        }
        Err(err) => failed_list(current, err, target),
    }
}

fn list_screen(app: &App, profile: &ViewProfile, page: &TaskPage) -> Screen {
    render::list_screen(profile, page, app.today(), app.ui.group_page_size)
}

fn failed_list(profile: &ViewProfile, err: BotError, target: RenderTarget) -> BotResult<Reply> {
    match err {
        BotError::Remote { status } => {
            warn!(status, "task list fetch failed");
            Ok(Reply::show(target, render::list_error_screen(profile)))
        }
        BotError::Transport(err) => {
            warn!(error = %err, "task list fetch did not complete");
            Ok(Reply::show(target, render::list_error_screen(profile)))
        }
        other => Err(other),
    }
}

fn toggled<T: Ord + Copy>(draft: &BTreeSet<T>, value: T) -> BTreeSet<T> {
    let mut next = draft.clone();
    if !next.remove(&value) {
        next.insert(value);
    }
    next
}

pub fn is_list_action(action: &Action) -> bool {
    matches!(
        action,
        Action::Refresh
            | Action::PagePrev
            | Action::PageNext
            | Action::GroupMore(_)
            | Action::GroupPreset(_)
            | Action::ToggleView
            | Action::OpenFilters
            | Action::Reset
            | Action::QuickUrgent
            | Action::QuickOverdue
            | Action::QuickToday
            | Action::OpenPriorities
            | Action::PriorityToggle { .. }
            | Action::PriorityApply(_)
            | Action::PriorityClear
            | Action::OpenStatuses
            | Action::StatusToggle { .. }
            | Action::StatusApply(_)
            | Action::StatusClear
            | Action::OpenCategoryFilter
            | Action::CategoryFilterPage(_)
            | Action::CategoryFilterSet(_)
            | Action::CategoryFilterNone
            | Action::CategoryTasks(_)
            | Action::OpenSort
            | Action::SortSet(_)
            | Action::SortToggleDirection
            | Action::Search
            | Action::BackToList
    )
}

#[tracing::instrument(skip(app, session), fields(user_id = session.user_id))]
pub async fn handle_list_action(
    app: &App,
    session: &Session,
    action: &Action,
) -> BotResult<Vec<Reply>> {
    let profile = session.profile().await?;
    let mut next = profile.clone();
    let today = app.today();

    let step = match action {
        Action::Refresh | Action::BackToList => Step::Reload,
        Action::PagePrev => {
            if profile.has_prev() {
                next.prev_page();
                Step::Commit
            } else {
                Step::Notice("Already on the first page.")
            }
        }
        Action::PageNext => {
            next.next_page();
            Step::NextPage
        }
        Action::GroupMore(bucket) => {
            next.advance_group(*bucket, app.ui.group_page_size);
            Step::Commit
        }
        Action::GroupPreset(bucket) => {
            next.apply_bucket_preset(*bucket, today);
            Step::Commit
        }
        Action::ToggleView => {
            next.toggle_view_mode();
            Step::Commit
        }
        Action::Reset => {
            next.reset();
            Step::Commit
        }
        Action::QuickUrgent => {
            next.toggle_urgent();
            Step::Commit
        }
        Action::QuickOverdue => {
            next.toggle_overdue();
            Step::Commit
        }
        Action::QuickToday => {
            next.toggle_today(today);
            Step::Commit
        }
        Action::OpenFilters => Step::Show(render::filters_menu(&profile)),
        Action::OpenPriorities => Step::Show(render::priority_selector(&profile.priorities)),
        Action::PriorityToggle { draft, value } => {
            Step::Show(render::priority_selector(&toggled(draft, *value)))
        }
        Action::PriorityClear => Step::Show(render::priority_selector(&BTreeSet::new())),
        Action::PriorityApply(set) => {
            next.apply_priorities(set.clone());
            Step::Commit
        }
        Action::OpenStatuses => Step::Show(render::status_selector(&profile.statuses)),
        Action::StatusToggle { draft, value } => {
            Step::Show(render::status_selector(&toggled(draft, *value)))
        }
        Action::StatusClear => Step::Show(render::status_selector(&BTreeSet::new())),
        Action::StatusApply(set) => {
            next.apply_statuses(set.clone());
            Step::Commit
        }
        Action::OpenCategoryFilter => {
            let categories = app.api.categories().list(session.user_id).await?;
            Step::Show(render::category_filter_selector(
                &categories,
                profile.category_id,
                profile.category_picker_page,
                app.ui.category_page_size,
            ))
        }
        Action::CategoryFilterPage(page) => {
            let categories = app.api.categories().list(session.user_id).await?;
            next.category_picker_page = *page;
            Step::Store(render::category_filter_selector(
                &categories,
                next.category_id,
                next.category_picker_page,
                app.ui.category_page_size,
            ))
        }
        Action::CategoryFilterSet(id) | Action::CategoryTasks(id) => {
            next.set_category(Some(*id));
            Step::Commit
        }
        Action::CategoryFilterNone => {
            next.set_category(None);
            Step::Commit
        }
        Action::OpenSort => Step::Show(render::sort_selector(&profile)),
        Action::SortSet(field) => {
            if next.sort_field == *field {
                next.toggle_sort_direction();
            } else {
                next.set_sort_field(*field);
            }
            Step::Store(render::sort_selector(&next))
        }
        Action::SortToggleDirection => {
            next.toggle_sort_direction();
            Step::Store(render::sort_selector(&next))
        }
        Action::Search => {
            session.set_prompt(&Prompt::Search).await?;
            Step::Show(render::search_prompt())
        }
        other => {
            warn!(action = %other, "not a list action");
            Step::Notice("This button is no longer available.")
        }
    };

    let reply = match step {
        Step::Reload => show_list(app, session, RenderTarget::Edit).await?,
        Step::Commit => commit_and_show(app, session, &profile, next, RenderTarget::Edit).await?,
        Step::NextPage => match fetch_page(app, session.user_id, &next).await {
            Ok(page) if next.page_offset >= page.total => Reply::notice("Already on the last page."),
            Ok(page) => {
                session.save_profile(&next).await?;
                Reply::edit(list_screen(app, &next, &page))
            }
            Err(err) => failed_list(&profile, err, RenderTarget::Edit)?,
        },
        Step::Show(screen) => Reply::edit(screen),
        Step::Store(screen) => {
            session.save_profile(&next).await?;
            Reply::edit(screen)
        }
        Step::Notice(text) => Reply::notice(text),
    };
    Ok(vec![reply])
}

/// Text received while the search prompt is pending.
#[tracing::instrument(skip_all, fields(user_id = session.user_id))]
pub async fn apply_search(app: &App, session: &Session, input: &str) -> BotResult<Vec<Reply>> {
    let profile = session.profile().await?;
    let mut next = profile.clone();
    next.set_search(input);
    session.clear_prompt().await?;
    let reply = commit_and_show(app, session, &profile, next, RenderTarget::Send).await?;
    Ok(vec![reply])
}

pub fn is_task_action(action: &Action) -> bool {
    matches!(
        action,
        Action::OpenTask(_)
            | Action::TaskDone(_)
            | Action::TaskReopen(_)
            | Action::TaskArchive(_)
            | Action::TaskRestore(_)
            | Action::TaskDelete(_)
            | Action::EditMenu(_)
            | Action::EditTitle(_)
            | Action::EditDescription(_)
            | Action::EditPriority(_)
            | Action::SetTaskPriority { .. }
            | Action::EditDue(_)
            | Action::SetTaskDue { .. }
            | Action::EditCategory { .. }
            | Action::SetTaskCategory { .. }
    )
}

/// Task card and its edit screens. A task that vanished renders the
/// not-found screen instead of an error.
#[tracing::instrument(skip(app, session), fields(user_id = session.user_id))]
pub async fn handle_task_action(
    app: &App,
    session: &Session,
    action: &Action,
) -> BotResult<Vec<Reply>> {
    match task_action(app, session, action).await {
        Err(BotError::NotFound) => Ok(vec![Reply::edit(render::task_missing())]),
        other => other,
    }
}

async fn task_action(app: &App, session: &Session, action: &Action) -> BotResult<Vec<Reply>> {
    let user = session.user_id;
    let tasks = app.api.tasks();

    let replies = match action {
        Action::OpenTask(id) => {
            let task = tasks.get(user, *id).await?;
            vec![Reply::edit(render::task_card(&task))]
        }
        Action::TaskDone(id) => {
            let task = tasks.update(user, *id, &TaskPatch::Status(Status::Done)).await?;
            info!(task_id = id, "task completed");
            vec![Reply::edit(render::task_card(&task)), Reply::notice("✅ Done")]
        }
        Action::TaskReopen(id) => {
            let task = tasks.update(user, *id, &TaskPatch::Status(Status::InProgress)).await?;
            vec![Reply::edit(render::task_card(&task)), Reply::notice("⏳ Back in progress")]
        }
        Action::TaskArchive(id) => {
            let task = tasks.archive(user, *id).await?;
            vec![Reply::edit(render::task_card(&task)), Reply::notice("📦 Archived")]
        }
        Action::TaskRestore(id) => {
            let task = tasks.restore(user, *id).await?;
            vec![Reply::edit(render::task_card(&task)), Reply::notice("♻️ Restored")]
        }
        Action::TaskDelete(id) => {
            tasks.delete(user, *id).await?;
            info!(task_id = id, "task deleted");
            vec![Reply::edit(render::task_deleted())]
        }
        Action::EditMenu(id) => {
            let task = tasks.get(user, *id).await?;
            vec![Reply::edit(render::task_edit_menu(&task))]
        }
        Action::EditTitle(id) => {
            let prompt = Prompt::EditTitle { task_id: *id };
            session.set_prompt(&prompt).await?;
            vec![Reply::edit(render::prompt(prompt.question()))]
        }
        Action::EditDescription(id) => {
            let prompt = Prompt::EditDescription { task_id: *id };
            session.set_prompt(&prompt).await?;
            vec![Reply::edit(render::prompt(prompt.question()))]
        }
        Action::EditPriority(id) => vec![Reply::edit(render::task_priority_picker(*id))],
        Action::SetTaskPriority { task, priority } => {
            let updated = tasks.update(user, *task, &TaskPatch::Priority(*priority)).await?;
            vec![Reply::edit(render::task_card(&updated)), Reply::notice("Priority updated")]
        }
        Action::EditDue(id) => vec![Reply::edit(render::task_due_picker(*id))],
        Action::SetTaskDue { task, due } => match wizard::shortcut_date(*due, app.today()) {
            Some(date) => {
                let updated = tasks.update(user, *task, &TaskPatch::Due(date)).await?;
                vec![Reply::edit(render::task_card(&updated)), Reply::notice("Deadline updated")]
            }
            None => {
                let prompt = Prompt::EditDue { task_id: *task };
                session.set_prompt(&prompt).await?;
                vec![Reply::edit(render::prompt(prompt.question()))]
            }
        },
        Action::EditCategory { task, page } => {
            let categories = app.api.categories().list(user).await?;
            vec![Reply::edit(render::task_category_picker(
                *task,
                &categories,
                *page,
                app.ui.category_page_size,
            ))]
        }
        Action::SetTaskCategory { task, category } => {
            let updated = tasks.update(user, *task, &TaskPatch::Category(*category)).await?;
            vec![Reply::edit(render::task_card(&updated)), Reply::notice("Category updated")]
        }
        other => {
            warn!(action = %other, "not a task action");
            vec![Reply::notice("This button is no longer available.")]
        }
    };
    Ok(replies)
}

#[tracing::instrument(skip(app, session), fields(user_id = session.user_id))]
pub async fn show_categories(
    app: &App,
    session: &Session,
    target: RenderTarget,
) -> BotResult<Reply> {
    let categories = app.api.categories().list(session.user_id).await?;
    Ok(Reply::show(target, render::categories_screen(&categories)))
}

#[tracing::instrument(skip(app, session), fields(user_id = session.user_id))]
pub async fn delete_category(
    app: &App,
    session: &Session,
    category_id: i64,
) -> BotResult<Vec<Reply>> {
    app.api.categories().delete(session.user_id, category_id).await?;
    let mut profile = session.profile().await?;
    if profile.category_id == Some(category_id) {
        profile.set_category(None);
        session.save_profile(&profile).await?;
    }
    info!(category_id, "category deleted");
    Ok(vec![
        show_categories(app, session, RenderTarget::Edit).await?,
        Reply::notice("🗑 Category deleted"),
    ])
}
