use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::grouping::Bucket;
use crate::profile::SortField;
use crate::task::{Priority, Status};

/// Upper bound the chat transport puts on a button payload.
pub const MAX_TOKEN_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action token: {token}")]
pub struct ActionParseError {
    pub token: String,
}

/// Deadline choices offered as buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueShortcut {
    Today,
    Tomorrow,
    InDays(u16),
    NoDeadline,
    Manual,
}

impl DueShortcut {
    fn token(self) -> String {
        match self {
            DueShortcut::Today => "today".to_string(),
            DueShortcut::Tomorrow => "tomorrow".to_string(),
            DueShortcut::InDays(n) => format!("+{n}"),
            DueShortcut::NoDeadline => "none".to_string(),
            DueShortcut::Manual => "manual".to_string(),
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token {
            "today" => Some(DueShortcut::Today),
            "tomorrow" => Some(DueShortcut::Tomorrow),
            "none" => Some(DueShortcut::NoDeadline),
            "manual" => Some(DueShortcut::Manual),
            _ => token.strip_prefix('+')?.parse().ok().map(DueShortcut::InDays),
        }
    }
}

/// Every button press the bot understands.
///
/// Selector drafts ride inside the token so that backing out of a selector
/// never touches the stored profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Refresh,
    PagePrev,
    PageNext,
    GroupMore(Bucket),
    GroupPreset(Bucket),
    ToggleView,
    OpenFilters,
    Reset,
    QuickUrgent,
    QuickOverdue,
    QuickToday,
    OpenPriorities,
    PriorityToggle { draft: BTreeSet<Priority>, value: Priority },
    PriorityApply(BTreeSet<Priority>),
    PriorityClear,
    OpenStatuses,
    StatusToggle { draft: BTreeSet<Status>, value: Status },
    StatusApply(BTreeSet<Status>),
    StatusClear,
    OpenCategoryFilter,
    CategoryFilterPage(usize),
    CategoryFilterSet(i64),
    CategoryFilterNone,
    OpenSort,
    SortSet(SortField),
    SortToggleDirection,
    Search,
    BackToList,

    OpenTask(i64),
    TaskDone(i64),
    TaskReopen(i64),
    TaskArchive(i64),
    TaskRestore(i64),
    TaskDelete(i64),
    EditMenu(i64),
    EditTitle(i64),
    EditDescription(i64),
    EditPriority(i64),
    SetTaskPriority { task: i64, priority: Priority },
    EditDue(i64),
    SetTaskDue { task: i64, due: DueShortcut },
    EditCategory { task: i64, page: usize },
    SetTaskCategory { task: i64, category: Option<i64> },

    NewTask,
    WizardPriority(Option<Priority>),
    WizardCategoryPage(usize),
    WizardCategory(Option<i64>),
    WizardDue(DueShortcut),

    Categories,
    NewCategory,
    CategoryTasks(i64),
    CategoryRename(i64),
    CategoryDelete(i64),

    Cancel,
    Noop,
}

fn mask<T, I>(all: &[T], selected: I) -> u8
where
    T: PartialEq + Copy,
    I: IntoIterator<Item = T>,
{
    selected
        .into_iter()
        .filter_map(|value| all.iter().position(|v| *v == value))
        .fold(0u8, |acc, idx| acc | (1 << idx))
}

fn unmask<T: Ord + Copy>(all: &[T], bits: u8) -> BTreeSet<T> {
    all.iter()
        .enumerate()
        .filter(|(idx, _)| bits & (1 << idx) != 0)
        .map(|(_, v)| *v)
        .collect()
}

fn opt_id(value: Option<i64>) -> String {
    value.map_or_else(|| "none".to_string(), |id| id.to_string())
}

fn parse_opt_id(token: &str) -> Option<Option<i64>> {
    if token == "none" {
        Some(None)
    } else {
        token.parse().ok().map(Some)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p_mask = |set: &BTreeSet<Priority>| mask(&Priority::ALL, set.iter().copied());
        let s_mask = |set: &BTreeSet<Status>| mask(&Status::ALL, set.iter().copied());
        match self {
            Action::Refresh => f.write_str("l:ref"),
            Action::PagePrev => f.write_str("l:pp"),
            Action::PageNext => f.write_str("l:pn"),
            Action::GroupMore(b) => write!(f, "l:gm:{}", b.as_str()),
            Action::GroupPreset(b) => write!(f, "l:gp:{}", b.as_str()),
            Action::ToggleView => f.write_str("l:vw"),
            Action::OpenFilters => f.write_str("l:flt"),
            Action::Reset => f.write_str("l:rst"),
            Action::QuickUrgent => f.write_str("l:qu"),
            Action::QuickOverdue => f.write_str("l:qo"),
            Action::QuickToday => f.write_str("l:qt"),
            Action::OpenPriorities => f.write_str("l:pr"),
            Action::PriorityToggle { draft, value } => {
                write!(f, "l:prt:{}:{}", p_mask(draft), value.as_str())
            }
            Action::PriorityApply(draft) => write!(f, "l:pra:{}", p_mask(draft)),
            Action::PriorityClear => f.write_str("l:prc"),
            Action::OpenStatuses => f.write_str("l:st"),
            Action::StatusToggle { draft, value } => {
                write!(f, "l:stt:{}:{}", s_mask(draft), value.as_str())
            }
            Action::StatusApply(draft) => write!(f, "l:sta:{}", s_mask(draft)),
            Action::StatusClear => f.write_str("l:stc"),
            Action::OpenCategoryFilter => f.write_str("l:cat"),
            Action::CategoryFilterPage(page) => write!(f, "l:catp:{page}"),
            Action::CategoryFilterSet(id) => write!(f, "l:cats:{id}"),
            Action::CategoryFilterNone => f.write_str("l:catn"),
            Action::OpenSort => f.write_str("l:srt"),
            Action::SortSet(field) => write!(f, "l:srts:{}", field.as_str()),
            Action::SortToggleDirection => f.write_str("l:srtd"),
            Action::Search => f.write_str("l:q"),
            Action::BackToList => f.write_str("l:back"),

            Action::OpenTask(id) => write!(f, "t:open:{id}"),
            Action::TaskDone(id) => write!(f, "t:done:{id}"),
            Action::TaskReopen(id) => write!(f, "t:reopen:{id}"),
            Action::TaskArchive(id) => write!(f, "t:arch:{id}"),
            Action::TaskRestore(id) => write!(f, "t:rest:{id}"),
            Action::TaskDelete(id) => write!(f, "t:del:{id}"),
            Action::EditMenu(id) => write!(f, "e:menu:{id}"),
            Action::EditTitle(id) => write!(f, "e:title:{id}"),
            Action::EditDescription(id) => write!(f, "e:desc:{id}"),
            Action::EditPriority(id) => write!(f, "e:prio:{id}"),
            Action::SetTaskPriority { task, priority } => {
                write!(f, "e:prios:{task}:{}", priority.as_str())
            }
            Action::EditDue(id) => write!(f, "e:due:{id}"),
            Action::SetTaskDue { task, due } => write!(f, "e:dues:{task}:{}", due.token()),
            Action::EditCategory { task, page } => write!(f, "e:cat:{task}:{page}"),
            Action::SetTaskCategory { task, category } => {
                write!(f, "e:cats:{task}:{}", opt_id(*category))
            }

            Action::NewTask => f.write_str("w:new"),
            Action::WizardPriority(p) => {
                write!(f, "w:prio:{}", p.map_or("skip", Priority::as_str))
            }
            Action::WizardCategoryPage(page) => write!(f, "w:catp:{page}"),
            Action::WizardCategory(id) => write!(f, "w:cat:{}", opt_id(*id)),
            Action::WizardDue(due) => write!(f, "w:due:{}", due.token()),

            Action::Categories => f.write_str("c:list"),
            Action::NewCategory => f.write_str("c:new"),
            Action::CategoryTasks(id) => write!(f, "c:tasks:{id}"),
            Action::CategoryRename(id) => write!(f, "c:ren:{id}"),
            Action::CategoryDelete(id) => write!(f, "c:del:{id}"),

            Action::Cancel => f.write_str("x:cancel"),
            Action::Noop => f.write_str("x:noop"),
        }
    }
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let err = || ActionParseError {
            token: token.to_string(),
        };
        let parts: Vec<&str> = token.split(':').collect();
        let id = |raw: &str| raw.parse::<i64>().map_err(|_| err());
        let num = |raw: &str| raw.parse::<usize>().map_err(|_| err());
        let bits = |raw: &str| raw.parse::<u8>().map_err(|_| err());
        let bucket = |raw: &str| Bucket::parse(raw).ok_or_else(err);
        let priority = |raw: &str| Priority::parse(raw).ok_or_else(err);
        let status = |raw: &str| Status::parse(raw).ok_or_else(err);
        let due = |raw: &str| DueShortcut::parse(raw).ok_or_else(err);
        let maybe_id = |raw: &str| parse_opt_id(raw).ok_or_else(err);

        let action = match parts.as_slice() {
            ["l", "ref"] => Action::Refresh,
            ["l", "pp"] => Action::PagePrev,
            ["l", "pn"] => Action::PageNext,
            ["l", "gm", b] => Action::GroupMore(bucket(b)?),
            ["l", "gp", b] => Action::GroupPreset(bucket(b)?),
            ["l", "vw"] => Action::ToggleView,
            ["l", "flt"] => Action::OpenFilters,
            ["l", "rst"] => Action::Reset,
            ["l", "qu"] => Action::QuickUrgent,
            ["l", "qo"] => Action::QuickOverdue,
            ["l", "qt"] => Action::QuickToday,
            ["l", "pr"] => Action::OpenPriorities,
            ["l", "prt", m, p] => Action::PriorityToggle {
                draft: unmask(&Priority::ALL, bits(m)?),
                value: priority(p)?,
            },
            ["l", "pra", m] => Action::PriorityApply(unmask(&Priority::ALL, bits(m)?)),
            ["l", "prc"] => Action::PriorityClear,
            ["l", "st"] => Action::OpenStatuses,
            ["l", "stt", m, s] => Action::StatusToggle {
                draft: unmask(&Status::ALL, bits(m)?),
                value: status(s)?,
            },
            ["l", "sta", m] => Action::StatusApply(unmask(&Status::ALL, bits(m)?)),
            ["l", "stc"] => Action::StatusClear,
            ["l", "cat"] => Action::OpenCategoryFilter,
            ["l", "catp", n] => Action::CategoryFilterPage(num(n)?),
            ["l", "cats", i] => Action::CategoryFilterSet(id(i)?),
            ["l", "catn"] => Action::CategoryFilterNone,
            ["l", "srt"] => Action::OpenSort,
            ["l", "srts", field] => Action::SortSet(SortField::parse(field).ok_or_else(err)?),
            ["l", "srtd"] => Action::SortToggleDirection,
            ["l", "q"] => Action::Search,
            ["l", "back"] => Action::BackToList,

            ["t", "open", i] => Action::OpenTask(id(i)?),
            ["t", "done", i] => Action::TaskDone(id(i)?),
            ["t", "reopen", i] => Action::TaskReopen(id(i)?),
            ["t", "arch", i] => Action::TaskArchive(id(i)?),
            ["t", "rest", i] => Action::TaskRestore(id(i)?),
            ["t", "del", i] => Action::TaskDelete(id(i)?),
            ["e", "menu", i] => Action::EditMenu(id(i)?),
            ["e", "title", i] => Action::EditTitle(id(i)?),
            ["e", "desc", i] => Action::EditDescription(id(i)?),
            ["e", "prio", i] => Action::EditPriority(id(i)?),
            ["e", "prios", i, p] => Action::SetTaskPriority {
                task: id(i)?,
                priority: priority(p)?,
            },
            ["e", "due", i] => Action::EditDue(id(i)?),
            ["e", "dues", i, d] => Action::SetTaskDue {
                task: id(i)?,
                due: due(d)?,
            },
            ["e", "cat", i, n] => Action::EditCategory {
                task: id(i)?,
                page: num(n)?,
            },
            ["e", "cats", i, c] => Action::SetTaskCategory {
                task: id(i)?,
                category: maybe_id(c)?,
            },

            ["w", "new"] => Action::NewTask,
            ["w", "prio", "skip"] => Action::WizardPriority(None),
            ["w", "prio", p] => Action::WizardPriority(Some(priority(p)?)),
            ["w", "catp", n] => Action::WizardCategoryPage(num(n)?),
            ["w", "cat", c] => Action::WizardCategory(maybe_id(c)?),
            ["w", "due", d] => Action::WizardDue(due(d)?),

            ["c", "list"] => Action::Categories,
            ["c", "new"] => Action::NewCategory,
            ["c", "tasks", i] => Action::CategoryTasks(id(i)?),
            ["c", "ren", i] => Action::CategoryRename(id(i)?),
            ["c", "del", i] => Action::CategoryDelete(id(i)?),

            ["x", "cancel"] => Action::Cancel,
            ["x", "noop"] => Action::Noop,
            _ => return Err(err()),
        };
        Ok(action)
    }
}

impl Action {
    /// Whether pressing this control ends a pending free-text prompt.
    pub fn leaves_prompt(&self) -> bool {
        !matches!(
            self,
            Action::Noop
                | Action::WizardPriority(_)
                | Action::WizardCategoryPage(_)
                | Action::WizardCategory(_)
                | Action::WizardDue(_)
        )
    }
}
