use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::datetime::day_bounds;
use crate::grouping::Bucket;
use crate::task::{Priority, Status};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    DueDate,
    Priority,
    UpdatedAt,
    Title,
}

impl SortField {
    pub const ALL: [SortField; 4] = [
        SortField::DueDate,
        SortField::Priority,
        SortField::UpdatedAt,
        SortField::Title,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::DueDate => "due_date",
            SortField::Priority => "priority",
            SortField::UpdatedAt => "updated_at",
            SortField::Title => "title",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == token)
    }

    pub fn label(self) -> &'static str {
        match self {
            SortField::DueDate => "Deadline",
            SortField::Priority => "Priority",
            SortField::UpdatedAt => "Updated",
            SortField::Title => "Title",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Asc => "↑",
            SortDirection::Desc => "↓",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Active,
    Archived,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewMode::Active => "active",
            ViewMode::Archived => "archived",
        })
    }
}

/// Closed due-date range. Both ends always travel together.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DueRange {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl DueRange {
    pub fn day(day: NaiveDate) -> Self {
        let (from, to) = day_bounds(day);
        Self { from, to }
    }
}

pub fn default_statuses() -> BTreeSet<Status> {
    BTreeSet::from([Status::Todo, Status::InProgress])
}

pub fn urgent_priorities() -> BTreeSet<Priority> {
    BTreeSet::from([Priority::High, Priority::Urgent])
}

fn fresh_cursors() -> BTreeMap<Bucket, usize> {
    Bucket::ALL.into_iter().map(|b| (b, 0)).collect()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Filter, sort and pagination state for one conversation's task list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewProfile {
    #[serde(default = "default_statuses")]
    pub statuses: BTreeSet<Status>,
    #[serde(default)]
    pub priorities: BTreeSet<Priority>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub due_range: Option<DueRange>,
    #[serde(default)]
    pub overdue_only: Option<bool>,
    #[serde(default)]
    pub search_text: Option<String>,
    #[serde(default)]
    pub sort_field: SortField,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default)]
    pub page_offset: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "fresh_cursors")]
    pub group_cursor: BTreeMap<Bucket, usize>,
    #[serde(default)]
    pub category_picker_page: usize,
}

impl Default for ViewProfile {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl ViewProfile {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            statuses: default_statuses(),
            priorities: BTreeSet::new(),
            category_id: None,
            due_range: None,
            overdue_only: None,
            search_text: None,
            sort_field: SortField::DueDate,
            sort_direction: SortDirection::Asc,
            view_mode: ViewMode::Active,
            page_offset: 0,
            page_size: page_size.max(1),
            group_cursor: fresh_cursors(),
            category_picker_page: 0,
        }
    }

    fn stride(&self) -> usize {
        self.page_size.max(1)
    }

    pub fn reset(&mut self) {
        *self = Self::with_page_size(self.page_size);
    }

    pub fn reset_paging(&mut self) {
        self.page_offset = 0;
        self.reset_group_cursors();
    }

    pub fn reset_group_cursors(&mut self) {
        for cursor in self.group_cursor.values_mut() {
            *cursor = 0;
        }
        for bucket in Bucket::ALL {
            self.group_cursor.entry(bucket).or_insert(0);
        }
    }

    pub fn page_number(&self) -> usize {
        self.page_offset / self.stride() + 1
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.stride()).max(1)
    }

    pub fn has_prev(&self) -> bool {
        self.page_offset > 0
    }

    pub fn has_next(&self, fetched: usize, total: usize) -> bool {
        self.page_offset + fetched < total
    }

    pub fn next_page(&mut self) {
        self.page_offset += self.stride();
        self.reset_group_cursors();
    }

    pub fn prev_page(&mut self) {
        self.page_offset = self.page_offset.saturating_sub(self.stride());
        self.reset_group_cursors();
    }

    pub fn cursor(&self, bucket: Bucket) -> usize {
        self.group_cursor.get(&bucket).copied().unwrap_or(0)
    }

    pub fn advance_group(&mut self, bucket: Bucket, group_page_size: usize) {
        *self.group_cursor.entry(bucket).or_insert(0) += group_page_size.max(1);
    }

    pub fn toggle_view_mode(&mut self) {
        match self.view_mode {
            ViewMode::Active => self.enter_archive(),
            ViewMode::Archived => {
                self.view_mode = ViewMode::Active;
                self.statuses = default_statuses();
                self.sort_field = SortField::DueDate;
                self.sort_direction = SortDirection::Asc;
            }
        }
        self.reset_paging();
    }

    fn enter_archive(&mut self) {
        self.view_mode = ViewMode::Archived;
        self.statuses.clear();
        self.sort_field = SortField::UpdatedAt;
        self.sort_direction = SortDirection::Desc;
    }

    pub fn toggle_urgent(&mut self) {
        if self.priorities == urgent_priorities() {
            self.priorities.clear();
        } else {
            self.priorities = urgent_priorities();
        }
        self.reset_paging();
    }

    pub fn toggle_overdue(&mut self) {
        self.overdue_only = match self.overdue_only {
            Some(true) => None,
            _ => Some(true),
        };
        self.reset_paging();
    }

    pub fn toggle_today(&mut self, today: NaiveDate) {
        self.due_range = match self.due_range {
            Some(_) => None,
            None => Some(DueRange::day(today)),
        };
        self.reset_paging();
    }

    pub fn apply_priorities(&mut self, priorities: BTreeSet<Priority>) {
        self.priorities = priorities;
        self.reset_paging();
    }

    pub fn apply_statuses(&mut self, statuses: BTreeSet<Status>) {
        self.statuses = statuses;
        self.reset_paging();
    }

    pub fn set_category(&mut self, category_id: Option<i64>) {
        self.category_id = category_id;
        self.reset_paging();
    }

    pub fn set_sort_field(&mut self, field: SortField) {
        self.sort_field = field;
        self.sort_direction = SortDirection::Asc;
        self.reset_paging();
    }

    pub fn toggle_sort_direction(&mut self) {
        self.sort_direction = self.sort_direction.flipped();
        self.reset_paging();
    }

    /// `-` (or blank input) clears the search.
    pub fn set_search(&mut self, input: &str) {
        let text = input.trim();
        self.search_text = if text.is_empty() || text == "-" {
            None
        } else {
            Some(text.to_string())
        };
        self.reset_paging();
    }

    /// Swaps in the preset behind a bucket header. Category and search stay.
    pub fn apply_bucket_preset(&mut self, bucket: Bucket, today: NaiveDate) {
        self.view_mode = ViewMode::Active;
        self.statuses = default_statuses();
        self.priorities.clear();
        self.overdue_only = None;
        self.due_range = None;
        self.sort_field = SortField::DueDate;
        self.sort_direction = SortDirection::Asc;
        match bucket {
            Bucket::Urgent => self.priorities = urgent_priorities(),
            Bucket::Overdue => self.overdue_only = Some(true),
            Bucket::Today => self.due_range = Some(DueRange::day(today)),
            Bucket::Done => {
                self.statuses = BTreeSet::from([Status::Done]);
                self.sort_field = SortField::UpdatedAt;
                self.sort_direction = SortDirection::Desc;
            }
            Bucket::Archived => self.enter_archive(),
            Bucket::Rest => {}
        }
        self.reset_paging();
    }

    pub fn has_search(&self) -> bool {
        self.search_text.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn filters_active(&self) -> bool {
        !self.priorities.is_empty()
            || self.category_id.is_some()
            || self.overdue_only == Some(true)
            || self.due_range.is_some()
            || self.has_search()
            || (self.view_mode == ViewMode::Active && self.statuses != default_statuses())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use super::{SortDirection, SortField, ViewMode, ViewProfile, urgent_priorities};
    use crate::grouping::Bucket;
    use crate::task::{Priority, Status};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).expect("valid date")
    }

    #[test]
    fn twenty_three_tasks_make_three_pages() {
        let profile = ViewProfile::default();
        assert_eq!(profile.page_number(), 1);
        assert_eq!(profile.page_count(23), 3);
        assert!(!profile.has_prev());
        assert!(profile.has_next(10, 23));
    }

    #[test]
    fn next_advances_one_page_until_exhausted() {
        let mut profile = ViewProfile::default();
        let total = 23;
        let mut pages = vec![profile.page_number()];
        while profile.has_next(10.min(total - profile.page_offset), total) {
            profile.next_page();
            pages.push(profile.page_number());
        }
        assert_eq!(pages, vec![1, 2, 3]);
        assert!(!profile.has_next(3, total));

        profile.prev_page();
        profile.prev_page();
        profile.prev_page();
        assert_eq!(profile.page_offset, 0);
    }

    #[test]
    fn page_count_is_at_least_one() {
        assert_eq!(ViewProfile::default().page_count(0), 1);
    }

    #[test]
    fn toggle_today_twice_is_a_no_op() {
        let mut profile = ViewProfile::default();
        profile.toggle_today(today());
        let range = profile.due_range.expect("range set");
        assert_eq!(range.from.date(), today());
        assert_eq!(range.to.date(), today());
        profile.toggle_today(today());
        assert_eq!(profile.due_range, None);
        assert_eq!(profile, ViewProfile::default());
    }

    #[test]
    fn toggle_urgent_is_idempotent() {
        let mut profile = ViewProfile::default();
        profile.priorities = BTreeSet::from([Priority::Low]);
        profile.toggle_urgent();
        assert_eq!(profile.priorities, urgent_priorities());
        profile.toggle_urgent();
        assert!(profile.priorities.is_empty());

        let mut fresh = ViewProfile::default();
        fresh.toggle_urgent();
        fresh.toggle_urgent();
        assert_eq!(fresh.priorities, ViewProfile::default().priorities);
    }

    #[test]
    fn archive_view_clears_statuses_and_flips_sort() {
        let mut profile = ViewProfile::default();
        profile.next_page();
        profile.toggle_view_mode();
        assert_eq!(profile.view_mode, ViewMode::Archived);
        assert!(profile.statuses.is_empty());
        assert_eq!(profile.sort_field, SortField::UpdatedAt);
        assert_eq!(profile.sort_direction, SortDirection::Desc);
        assert_eq!(profile.page_offset, 0);

        profile.toggle_view_mode();
        assert_eq!(profile.view_mode, ViewMode::Active);
        assert_eq!(profile.statuses, BTreeSet::from([Status::Todo, Status::InProgress]));
        assert_eq!(profile.sort_field, SortField::DueDate);
    }

    #[test]
    fn dash_always_clears_search() {
        let mut profile = ViewProfile::default();
        profile.set_search("-");
        assert_eq!(profile.search_text, None);
        profile.set_search("  groceries ");
        assert_eq!(profile.search_text.as_deref(), Some("groceries"));
        profile.set_search("-");
        assert_eq!(profile.search_text, None);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut profile = ViewProfile::default();
        profile.toggle_urgent();
        profile.toggle_overdue();
        profile.set_category(Some(7));
        profile.set_search("x");
        profile.toggle_view_mode();
        profile.advance_group(Bucket::Rest, 8);
        profile.category_picker_page = 3;
        profile.next_page();
        profile.reset();
        assert_eq!(profile, ViewProfile::default());
    }

    #[test]
    fn filter_mutations_reset_paging() {
        let mut profile = ViewProfile::default();
        profile.advance_group(Bucket::Urgent, 8);
        profile.next_page();
        assert_eq!(profile.cursor(Bucket::Urgent), 0);

        profile.advance_group(Bucket::Urgent, 8);
        assert_eq!(profile.cursor(Bucket::Urgent), 8);
        profile.set_sort_field(SortField::Title);
        assert_eq!(profile.page_offset, 0);
        assert_eq!(profile.cursor(Bucket::Urgent), 0);
    }

    #[test]
    fn sort_field_select_resets_direction() {
        let mut profile = ViewProfile::default();
        profile.toggle_sort_direction();
        assert_eq!(profile.sort_direction, SortDirection::Desc);
        profile.set_sort_field(SortField::Priority);
        assert_eq!(profile.sort_direction, SortDirection::Asc);
    }

    #[test]
    fn filters_active_tracks_non_default_state() {
        let mut profile = ViewProfile::default();
        assert!(!profile.filters_active());
        profile.apply_statuses(BTreeSet::from([Status::Done]));
        assert!(profile.filters_active());

        let mut archived = ViewProfile::default();
        archived.toggle_view_mode();
        assert!(!archived.filters_active());
        archived.toggle_overdue();
        assert!(archived.filters_active());
    }

    #[test]
    fn bucket_presets() {
        let mut profile = ViewProfile::default();
        profile.set_search("old");
        profile.toggle_overdue();
        profile.next_page();
        profile.apply_bucket_preset(Bucket::Done, today());
        assert_eq!(profile.statuses, BTreeSet::from([Status::Done]));
        assert_eq!(profile.sort_field, SortField::UpdatedAt);
        assert_eq!(profile.overdue_only, None);
        assert_eq!(profile.page_offset, 0);
        assert_eq!(profile.search_text.as_deref(), Some("old"));

        profile.apply_bucket_preset(Bucket::Today, today());
        assert!(profile.due_range.is_some());
        assert_eq!(profile.statuses, BTreeSet::from([Status::Todo, Status::InProgress]));

        profile.apply_bucket_preset(Bucket::Archived, today());
        assert_eq!(profile.view_mode, ViewMode::Archived);
        assert!(profile.statuses.is_empty());
        assert_eq!(profile.due_range, None);

        profile.set_search("-");
        profile.apply_bucket_preset(Bucket::Rest, today());
        assert_eq!(profile, ViewProfile::default());
    }

    #[test]
    fn bucket_preset_keeps_category_and_search() {
        let mut profile = ViewProfile::default();
        profile.set_category(Some(7));
        profile.set_search("milk");
        profile.apply_bucket_preset(Bucket::Urgent, today());
        assert_eq!(profile.category_id, Some(7));
        assert_eq!(profile.search_text.as_deref(), Some("milk"));
        assert_eq!(profile.priorities, urgent_priorities());
    }

    #[test]
    fn profile_survives_json() {
        let mut profile = ViewProfile::default();
        profile.toggle_today(today());
        profile.advance_group(Bucket::Today, 8);
        let raw = serde_json::to_string(&profile).expect("serialize");
        let back: ViewProfile = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(back, profile);

        let sparse: ViewProfile = serde_json::from_str("{}").expect("sparse");
        assert_eq!(sparse, ViewProfile::default());
    }
}
