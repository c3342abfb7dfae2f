//! Student quest progression: task statuses, active task, timer and view state.
//!
//! The controller never mutates the quest itself; it only tracks per-task status.
//! Time is passed in by the caller (`tick(now)`) so the one-second ticker and the
//! tests drive the same code.

use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{Quest, Task};
use crate::error::{AppError, FlowError, FormError};
use crate::util::format_clock;

/// Avatars a student can pick during onboarding.
pub const AVATAR_IDS: [u8; 4] = [1, 2, 3, 4];

pub const CONGRATULATIONS: [&str; 6] = [
  "Làm tốt lắm!",
  "Tuyệt vời!",
  "Xuất sắc!",
  "Bạn thật thông minh!",
  "Cứ thế phát huy nhé!",
  "Một nhiệm vụ nữa đã được giải quyết!",
];

/// Countdown turns urgent in the last minute.
const ENDING_THRESHOLD_SECS: u64 = 60;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  Completed,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewState {
  Onboarding,
  InQuest,
  TaskComplete { message: &'static str },
  QuestFinished,
  TimeUp,
}

impl ViewState {
  pub fn name(&self) -> &'static str {
    match self {
      ViewState::Onboarding => "onboarding",
      ViewState::InQuest => "in_quest",
      ViewState::TaskComplete { .. } => "task_complete",
      ViewState::QuestFinished => "quest_finished",
      ViewState::TimeUp => "time_up",
    }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
  pub name: String,
  pub avatar_id: u8,
}

/// Clock shown while the quest is running.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeDisplay {
  pub label: &'static str,
  pub time: String,
  pub is_countdown: bool,
  pub is_ending: bool,
}

/// Numbers for the finished / time-up screens.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
  pub completed: usize,
  pub total: usize,
  pub elapsed: String,
}

/// What a tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
  /// Ticking is suspended in this state; the ticker should stop.
  Suspended,
  /// Start time recorded on this tick.
  Started,
  Running { elapsed: u64 },
  TimeUp,
}

#[derive(Debug)]
pub struct QuestProgression {
  quest: Arc<Quest>,
  statuses: Vec<TaskStatus>,
  active: usize,
  view: ViewState,
  student: Option<Student>,
  start_time: Option<Instant>,
  elapsed_secs: u64,
  time_up: bool,
}

impl QuestProgression {
  pub fn new(quest: Arc<Quest>) -> Self {
    let statuses = vec![TaskStatus::Pending; quest.tasks.len()];
    Self {
      quest,
      statuses,
      active: 0,
      view: ViewState::Onboarding,
      student: None,
      start_time: None,
      elapsed_secs: 0,
      time_up: false,
    }
  }

  pub fn quest(&self) -> &Arc<Quest> {
    &self.quest
  }

  pub fn view(&self) -> ViewState {
    self.view
  }

  pub fn statuses(&self) -> &[TaskStatus] {
    &self.statuses
  }

  pub fn active_index(&self) -> usize {
    self.active
  }

  pub fn active_task(&self) -> Option<&Task> {
    self.quest.tasks.get(self.active)
  }

  pub fn student(&self) -> Option<&Student> {
    self.student.as_ref()
  }

  pub fn elapsed_secs(&self) -> u64 {
    self.elapsed_secs
  }

  pub fn is_time_up(&self) -> bool {
    self.time_up
  }

  pub fn is_finished(&self) -> bool {
    !self.statuses.contains(&TaskStatus::Pending)
  }

  /// The ticker only runs while the quest is live.
  pub fn is_ticking(&self) -> bool {
    self.view == ViewState::InQuest && !self.is_finished() && !self.time_up
  }

  /// Whether the active task may be answered right now.
  pub fn accepts_answers(&self) -> bool {
    self.view == ViewState::InQuest
      && !self.time_up
      && self.statuses.get(self.active) == Some(&TaskStatus::Pending)
  }

  /// onboarding → in_quest. The clock starts on the first tick afterwards.
  pub fn start(&mut self, name: &str, avatar_id: Option<u8>) -> Result<(), AppError> {
    if self.view != ViewState::Onboarding {
      return Err(FlowError::WrongView { state: self.view.name() }.into());
    }
    let name = name.trim();
    let avatar_id = match avatar_id {
      Some(a) if !name.is_empty() => a,
      _ => return Err(FormError::MissingStudentIdentity.into()),
    };
    if !AVATAR_IDS.contains(&avatar_id) {
      return Err(FlowError::UnknownAvatar(avatar_id).into());
    }
    self.student = Some(Student { name: name.to_string(), avatar_id });
    self.view = ViewState::InQuest;
    info!(target: "quest", student = %name, avatar_id, tasks = self.statuses.len(), "Quest started");
    Ok(())
  }

  /// One timer tick. Elapsed time is measured from the first tick, so it never goes backwards.
  pub fn tick(&mut self, now: Instant) -> TickOutcome {
    if !self.is_ticking() {
      return TickOutcome::Suspended;
    }
    let Some(start) = self.start_time else {
      self.start_time = Some(now);
      return TickOutcome::Started;
    };

    let elapsed = now.saturating_duration_since(start).as_secs();
    self.elapsed_secs = self.elapsed_secs.max(elapsed);

    if let Some(limit) = self.quest.time_limit_in_seconds {
      if limit as i64 - self.elapsed_secs as i64 <= 0 {
        self.time_up = true;
        self.view = ViewState::TimeUp;
        info!(target: "quest", elapsed = self.elapsed_secs, limit, completed = self.completed_count(), "Time is up");
        return TickOutcome::TimeUp;
      }
    }
    TickOutcome::Running { elapsed: self.elapsed_secs }
  }

  /// Mark the active task completed after a correct answer.
  pub fn complete_active_task<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<ViewState, FlowError> {
    if self.time_up {
      return Err(FlowError::TimeUp);
    }
    if self.view != ViewState::InQuest {
      return Err(FlowError::WrongView { state: self.view.name() });
    }
    if self.statuses.get(self.active) != Some(&TaskStatus::Pending) {
      return Err(FlowError::TaskCompleted(self.active));
    }

    self.statuses[self.active] = TaskStatus::Completed;
    self.view = if self.is_finished() {
      info!(target: "quest", elapsed = self.elapsed_secs, "Quest finished");
      ViewState::QuestFinished
    } else {
      let message = CONGRATULATIONS.choose(rng).copied().unwrap_or(CONGRATULATIONS[0]);
      ViewState::TaskComplete { message }
    };
    debug!(target: "quest", index = self.active, view = self.view.name(), "Task completed");
    Ok(self.view)
  }

  /// task_complete → in_quest on the next pending task.
  pub fn next_task(&mut self) -> Result<usize, FlowError> {
    match self.view {
      ViewState::TaskComplete { .. } => {
        if let Some(next) = self.find_next_pending(self.active) {
          self.active = next;
        }
        self.view = ViewState::InQuest;
        Ok(self.active)
      }
      ViewState::Onboarding | ViewState::InQuest | ViewState::QuestFinished | ViewState::TimeUp => {
        Err(FlowError::WrongView { state: self.view.name() })
      }
    }
  }

  /// Move past the active task without changing its status.
  pub fn skip(&mut self) -> Result<usize, FlowError> {
    match self.view {
      ViewState::InQuest if !self.time_up => {
        if let Some(next) = self.find_next_pending(self.active) {
          self.active = next;
        }
        Ok(self.active)
      }
      ViewState::InQuest => Err(FlowError::TimeUp),
      ViewState::Onboarding
      | ViewState::TaskComplete { .. }
      | ViewState::QuestFinished
      | ViewState::TimeUp => Err(FlowError::WrongView { state: self.view.name() }),
    }
  }

  /// Jump straight to a task by index.
  pub fn select_task(&mut self, index: usize) -> Result<(), FlowError> {
    if self.view != ViewState::InQuest {
      return Err(FlowError::WrongView { state: self.view.name() });
    }
    if self.time_up {
      return Err(FlowError::TimeUp);
    }
    match self.statuses.get(index) {
      None => Err(FlowError::TaskIndexOutOfRange(index)),
      Some(TaskStatus::Completed) => Err(FlowError::TaskCompleted(index)),
      Some(TaskStatus::Pending) => {
        self.active = index;
        Ok(())
      }
    }
  }

  /// Circular scan forward from `start` (exclusive). Falls back to the first pending
  /// task overall, which is how the active task is kept when it is the last one pending.
  pub fn find_next_pending(&self, start: usize) -> Option<usize> {
    let n = self.statuses.len();
    (1..n)
      .map(|i| (start + i) % n)
      .find(|&i| self.statuses[i] == TaskStatus::Pending)
      .or_else(|| self.statuses.iter().position(|s| *s == TaskStatus::Pending))
  }

  pub fn completed_count(&self) -> usize {
    self.statuses.iter().filter(|s| **s == TaskStatus::Completed).count()
  }

  /// Remaining seconds, floored at zero. None for unlimited quests.
  pub fn remaining_secs(&self) -> Option<u64> {
    self.quest
      .time_limit_in_seconds
      .map(|limit| (limit as u64).saturating_sub(self.elapsed_secs))
  }

  /// Clock for the in-quest screen; hidden in every other view.
  pub fn time_display(&self) -> Option<TimeDisplay> {
    if self.view != ViewState::InQuest {
      return None;
    }
    Some(match self.remaining_secs() {
      Some(left) => TimeDisplay {
        label: "Thời gian còn lại",
        time: format_clock(left),
        is_countdown: true,
        is_ending: left > 0 && left <= ENDING_THRESHOLD_SECS,
      },
      None => TimeDisplay {
        label: "Tổng thời gian",
        time: format_clock(self.elapsed_secs()),
        is_countdown: false,
        is_ending: false,
      },
    })
  }

  pub fn summary(&self) -> ProgressSummary {
    ProgressSummary {
      completed: self.completed_count(),
      total: self.statuses.len(),
      elapsed: format_clock(self.elapsed_secs()),
    }
  }
}
