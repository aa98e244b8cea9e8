use chrono::NaiveDate;
use serde::{
  Deserialize,
  Serialize
};

use crate::task::{
  Priority,
  Status,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash
)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
  Archived,
  Done,
  Urgent,
  Overdue,
  Today,
  Rest
}

impl Bucket {
  pub const ALL: [Bucket; 6] = [
    Bucket::Archived,
    Bucket::Done,
    Bucket::Urgent,
    Bucket::Overdue,
    Bucket::Today,
    Bucket::Rest
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | Bucket::Archived => "archived",
      | Bucket::Done => "done",
      | Bucket::Urgent => "urgent",
      | Bucket::Overdue => "overdue",
      | Bucket::Today => "today",
      | Bucket::Rest => "rest"
    }
  }

  pub fn parse(
    token: &str
  ) -> Option<Self> {
    Self::ALL
      .into_iter()
      .find(|b| b.as_str() == token)
  }

  pub fn label(self) -> &'static str {
    match self {
      | Bucket::Archived => "📦 Archived",
      | Bucket::Done => "✅ Done",
      | Bucket::Urgent => "🔥 Urgent",
      | Bucket::Overdue => "⏰ Overdue",
      | Bucket::Today => "🎯 Today",
      | Bucket::Rest => "📋 Other"
    }
  }

  /// First matching rule wins; priority is checked before the due date.
  pub fn classify(
    task: &Task,
    today: NaiveDate
  ) -> Self {
    if task.status == Status::Archived {
      return Bucket::Archived;
    }
    if task.status == Status::Done {
      return Bucket::Done;
    }
    if matches!(
      task.priority,
      Priority::High | Priority::Urgent
    ) {
      return Bucket::Urgent;
    }
    match task.due_date {
      | Some(due) if due < today => {
        Bucket::Overdue
      }
      | Some(due) if due == today => {
        Bucket::Today
      }
      | _ => Bucket::Rest
    }
  }
}

#[derive(Debug, Clone)]
pub struct Group {
  pub bucket: Bucket,
  pub tasks:  Vec<Task>
}

/// Slice of a group shown for one cursor position.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
  pub start:    usize,
  pub items:    &'a [Task],
  pub has_more: bool
}

impl Group {
  /// A cursor past the end is clamped to the last full window.
  pub fn window(
    &self,
    cursor: usize,
    size: usize
  ) -> Window<'_> {
    let len = self.tasks.len();
    let size = size.max(1);
    let start = if len == 0 {
      0
    } else if cursor >= len {
      ((len - 1) / size) * size
    } else {
      cursor
    };
    let end = (start + size).min(len);
    Window {
      start,
      items: &self.tasks[start..end],
      has_more: end < len
    }
  }
}

/// Non-empty buckets in display order.
#[derive(Debug, Clone, Default)]
pub struct Groups {
  groups: Vec<Group>
}

impl Groups {
  pub fn iter(
    &self
  ) -> impl Iterator<Item = &Group> {
    self.groups.iter()
  }

  pub fn get(
    &self,
    bucket: Bucket
  ) -> Option<&Group> {
    self
      .groups
      .iter()
      .find(|g| g.bucket == bucket)
  }

  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }

  pub fn task_count(&self) -> usize {
    self
      .groups
      .iter()
      .map(|g| g.tasks.len())
      .sum()
  }
}

#[tracing::instrument(skip(tasks))]
pub fn group_tasks(
  tasks: &[Task],
  today: NaiveDate
) -> Groups {
  let mut slots: Vec<Vec<Task>> =
    vec![Vec::new(); Bucket::ALL.len()];
  for task in tasks {
    let bucket =
      Bucket::classify(task, today);
    slots[bucket as usize]
      .push(task.clone());
  }

  let groups: Vec<Group> = Bucket::ALL
    .into_iter()
    .zip(slots)
    .filter(|(_, tasks)| {
      !tasks.is_empty()
    })
    .map(|(bucket, tasks)| {
      Group {
        bucket,
        tasks
      }
    })
    .collect();

  tracing::trace!(
    input = tasks.len(),
    groups = groups.len(),
    "grouped tasks"
  );
  Groups {
    groups
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Days,
    NaiveDate
  };

  use super::{
    Bucket,
    group_tasks
  };
  use crate::task::{
    Priority,
    Status,
    Task
  };

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 14)
      .expect("valid date")
  }

  fn task(
    id: i64,
    status: Status,
    priority: Priority,
    due: Option<NaiveDate>
  ) -> Task {
    Task {
      id,
      title: format!("task {id}"),
      description: None,
      status,
      priority,
      category: None,
      due_date: due,
      archived: false,
      updated_at: None
    }
  }

  #[test]
  fn high_priority_beats_overdue() {
    let yesterday = today()
      .checked_sub_days(Days::new(1));
    let t = task(
      1,
      Status::Todo,
      Priority::High,
      yesterday
    );
    assert_eq!(
      Bucket::classify(&t, today()),
      Bucket::Urgent
    );

    let low = task(
      2,
      Status::Todo,
      Priority::Low,
      yesterday
    );
    assert_eq!(
      Bucket::classify(&low, today()),
      Bucket::Overdue
    );
  }

  #[test]
  fn status_rules_come_first() {
    let archived = task(
      1,
      Status::Archived,
      Priority::Urgent,
      None
    );
    let done = task(
      2,
      Status::Done,
      Priority::Urgent,
      Some(today())
    );
    assert_eq!(
      Bucket::classify(&archived, today()),
      Bucket::Archived
    );
    assert_eq!(
      Bucket::classify(&done, today()),
      Bucket::Done
    );
  }

  #[test]
  fn grouping_is_a_stable_partition() {
    let t = today();
    let tomorrow =
      t.checked_add_days(Days::new(1));
    let input = vec![
      task(1, Status::Todo, Priority::Low, Some(t)),
      task(2, Status::Done, Priority::Low, None),
      task(3, Status::Todo, Priority::Urgent, None),
      task(4, Status::InProgress, Priority::Medium, tomorrow),
      task(5, Status::Todo, Priority::Medium, Some(t)),
      task(6, Status::Todo, Priority::High, tomorrow),
      task(7, Status::InProgress, Priority::Low, None),
    ];

    let groups = group_tasks(&input, t);
    assert_eq!(
      groups.task_count(),
      input.len()
    );

    let mut seen: Vec<i64> = groups
      .iter()
      .flat_map(|g| {
        g.tasks.iter().map(|x| x.id)
      })
      .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7]);

    let ids = |b: Bucket| -> Vec<i64> {
      groups
        .get(b)
        .map(|g| {
          g.tasks
            .iter()
            .map(|x| x.id)
            .collect()
        })
        .unwrap_or_default()
    };
    assert_eq!(ids(Bucket::Urgent), vec![3, 6]);
    assert_eq!(ids(Bucket::Today), vec![1, 5]);
    assert_eq!(ids(Bucket::Rest), vec![4, 7]);
    assert_eq!(ids(Bucket::Done), vec![2]);
    assert!(groups.get(Bucket::Overdue).is_none());

    let order: Vec<Bucket> =
      groups.iter().map(|g| g.bucket).collect();
    assert_eq!(
      order,
      vec![
        Bucket::Done,
        Bucket::Urgent,
        Bucket::Today,
        Bucket::Rest
      ]
    );
  }

  #[test]
  fn window_clamps_cursor_past_end() {
    let t = today();
    let input: Vec<Task> = (1..=10)
      .map(|id| {
        task(id, Status::Todo, Priority::Low, None)
      })
      .collect();
    let groups = group_tasks(&input, t);
    let rest = groups
      .get(Bucket::Rest)
      .expect("rest group");

    let first = rest.window(0, 8);
    assert_eq!(first.items.len(), 8);
    assert!(first.has_more);

    let second = rest.window(8, 8);
    assert_eq!(second.items.len(), 2);
    assert!(!second.has_more);

    let clamped = rest.window(40, 8);
    assert_eq!(clamped.start, 8);
    assert_eq!(clamped.items[0].id, 9);
  }
}
