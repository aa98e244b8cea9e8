use crate::datetime::format_query_timestamp;
use crate::profile::{
  ViewMode,
  ViewProfile
};
use crate::task::Status;

pub type QueryParams =
  Vec<(String, String)>;

fn push(
  params: &mut QueryParams,
  key: &str,
  value: impl Into<String>
) {
  params
    .push((key.to_string(), value.into()));
}

/// Projects a profile onto the task list endpoint's query string.
///
/// Repeated keys carry set-valued filters. Absent filters send nothing.
#[must_use]
pub fn to_query_params(
  profile: &ViewProfile
) -> QueryParams {
  let mut params = QueryParams::new();
  push(
    &mut params,
    "offset",
    profile.page_offset.to_string()
  );
  push(
    &mut params,
    "limit",
    profile.page_size.to_string()
  );
  push(
    &mut params,
    "sort_by",
    profile.sort_field.as_str()
  );
  push(
    &mut params,
    "sort_order",
    profile.sort_direction.as_str()
  );
  push(
    &mut params,
    "include_archived",
    "false"
  );

  match profile.view_mode {
    | ViewMode::Archived => {
      push(
        &mut params,
        "status",
        Status::Archived.as_str()
      );
    }
    | ViewMode::Active => {
      for status in &profile.statuses {
        push(
          &mut params,
          "status",
          status.as_str()
        );
      }
    }
  }

  for priority in &profile.priorities {
    push(
      &mut params,
      "priority",
      priority.as_str()
    );
  }

  if let Some(category_id) =
    profile.category_id
  {
    push(
      &mut params,
      "category_id",
      category_id.to_string()
    );
  }

  if let Some(range) = profile.due_range
  {
    push(
      &mut params,
      "due_date_from",
      format_query_timestamp(range.from)
    );
    push(
      &mut params,
      "due_date_to",
      format_query_timestamp(range.to)
    );
  }

  if profile.overdue_only == Some(true) {
    push(
      &mut params,
      "is_overdue",
      "true"
    );
  }

  if let Some(search) = profile
    .search_text
    .as_deref()
    .filter(|s| !s.is_empty())
  {
    push(&mut params, "search", search);
  }

  tracing::trace!(
    count = params.len(),
    "projected profile to query"
  );
  params
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use chrono::NaiveDate;

  use super::to_query_params;
  use crate::profile::ViewProfile;
  use crate::task::{
    Priority,
    Status
  };

  fn values<'a>(
    params: &'a [(String, String)],
    key: &str
  ) -> Vec<&'a str> {
    params
      .iter()
      .filter(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
      .collect()
  }

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 14)
      .expect("valid date")
  }

  #[test]
  fn default_profile_sends_base_params() {
    let params = to_query_params(
      &ViewProfile::default()
    );
    assert_eq!(
      values(&params, "offset"),
      vec!["0"]
    );
    assert_eq!(
      values(&params, "limit"),
      vec!["10"]
    );
    assert_eq!(
      values(&params, "sort_by"),
      vec!["due_date"]
    );
    assert_eq!(
      values(&params, "sort_order"),
      vec!["asc"]
    );
    assert_eq!(
      values(&params, "include_archived"),
      vec!["false"]
    );
    assert_eq!(
      values(&params, "status"),
      vec!["todo", "in_progress"]
    );
    assert!(
      values(&params, "priority")
        .is_empty()
    );
    assert!(
      values(&params, "search").is_empty()
    );
    assert!(
      values(&params, "is_overdue")
        .is_empty()
    );
  }

  #[test]
  fn archived_view_overrides_statuses() {
    let mut profile =
      ViewProfile::default();
    profile.toggle_view_mode();
    profile.statuses =
      BTreeSet::from([Status::Done]);
    let params =
      to_query_params(&profile);
    assert_eq!(
      values(&params, "status"),
      vec!["archived"]
    );
    assert_eq!(
      values(&params, "sort_by"),
      vec!["updated_at"]
    );
  }

  #[test]
  fn empty_statuses_send_no_status() {
    let mut profile =
      ViewProfile::default();
    profile.apply_statuses(BTreeSet::new());
    let params =
      to_query_params(&profile);
    assert!(
      values(&params, "status").is_empty()
    );
  }

  #[test]
  fn due_range_is_all_or_nothing() {
    let mut profile =
      ViewProfile::default();
    for _ in 0..3 {
      profile.toggle_today(today());
      let params =
        to_query_params(&profile);
      let from =
        values(&params, "due_date_from");
      let to =
        values(&params, "due_date_to");
      assert_eq!(from.len(), to.len());
    }

    let params =
      to_query_params(&profile);
    assert_eq!(
      values(&params, "due_date_from"),
      vec!["2026-10-14T00:00:00"]
    );
    assert_eq!(
      values(&params, "due_date_to"),
      vec!["2026-10-14T23:59:59"]
    );
  }

  #[test]
  fn filters_pass_through() {
    let mut profile =
      ViewProfile::default();
    profile.apply_priorities(
      BTreeSet::from([
        Priority::Urgent,
        Priority::Low
      ])
    );
    profile.set_category(Some(42));
    profile.toggle_overdue();
    profile.set_search("milk");
    profile.next_page();

    let params =
      to_query_params(&profile);
    assert_eq!(
      values(&params, "priority"),
      vec!["low", "urgent"]
    );
    assert_eq!(
      values(&params, "category_id"),
      vec!["42"]
    );
    assert_eq!(
      values(&params, "is_overdue"),
      vec!["true"]
    );
    assert_eq!(
      values(&params, "search"),
      vec!["milk"]
    );
    assert_eq!(
      values(&params, "offset"),
      vec!["10"]
    );
  }
}
