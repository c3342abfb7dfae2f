//! One browser session: the credential held in memory plus the current screen.
//!
//! Screens: authoring form → draft review → student play. Reset always returns to
//! the authoring form and keeps the credential.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attempt::TaskAttempt;
use crate::authoring::AuthoringForm;
use crate::catalog::Catalog;
use crate::domain::{Quest, QuestContext};
use crate::error::{AppError, FlowError, GatewayError};
use crate::progression::{QuestProgression, TickOutcome};
use crate::review::ReviewSession;

pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Debug)]
pub struct AuthoringScreen {
  pub form: AuthoringForm,
  pub generating: bool,
  pub error: Option<String>,
}

/// Student screen: progression, the attempt for the active task and the one-second ticker.
#[derive(Debug)]
pub struct StudentPlay {
  pub progression: QuestProgression,
  attempt: Option<TaskAttempt>,
  ticker: Option<JoinHandle<()>>,
}

impl StudentPlay {
  pub fn new(quest: Arc<Quest>) -> Self {
    let mut play = Self { progression: QuestProgression::new(quest), attempt: None, ticker: None };
    play.sync_attempt();
    play
  }

  pub fn attempt(&self) -> Option<&TaskAttempt> {
    self.attempt.as_ref()
  }

  pub fn attempt_mut(&mut self) -> Option<&mut TaskAttempt> {
    self.attempt.as_mut()
  }

  /// Keep exactly one attempt for the active task. A different task gets a fresh one.
  pub fn sync_attempt(&mut self) {
    let Some(task) = self.progression.active_task() else {
      self.attempt = None;
      return;
    };
    if self.attempt.as_ref().map(TaskAttempt::task_id) != Some(task.id) {
      self.attempt = Some(TaskAttempt::new(task));
    }
  }

  pub fn is_ticker_running(&self) -> bool {
    self.ticker.as_ref().is_some_and(|h| !h.is_finished())
  }

  /// Start the ticker while the quest is live, abort it otherwise.
  pub fn sync_ticker(&mut self, session: Weak<Mutex<Session>>) {
    if !self.progression.is_ticking() {
      self.stop_ticker();
      if let Some(a) = self.attempt.as_mut() {
        a.abandon_recording();
      }
      return;
    }
    if self.is_ticker_running() {
      return;
    }
    let quest = Arc::clone(self.progression.quest());
    self.ticker = Some(tokio::spawn(run_ticker(session, quest)));
  }

  fn stop_ticker(&mut self) {
    if let Some(h) = self.ticker.take() {
      h.abort();
    }
  }
}

impl Drop for StudentPlay {
  fn drop(&mut self) {
    self.stop_ticker();
  }
}

/// Ticks once per second until the quest stops ticking or the session goes away.
async fn run_ticker(session: Weak<Mutex<Session>>, quest: Arc<Quest>) {
  let mut interval = tokio::time::interval(Duration::from_secs(1));
  interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
  loop {
    interval.tick().await;
    let Some(handle) = session.upgrade() else { break };
    let mut guard = handle.lock().await;
    let session_id = guard.id;
    let Screen::Student(play) = &mut guard.screen else { break };
    // A newer play screen owns its own ticker.
    if !Arc::ptr_eq(play.progression.quest(), &quest) {
      break;
    }
    match play.progression.tick(tokio::time::Instant::now().into_std()) {
      TickOutcome::Started => debug!(target: "quest", %session_id, "Timer started"),
      TickOutcome::Running { .. } => {}
      TickOutcome::TimeUp | TickOutcome::Suspended => {
        if let Some(a) = play.attempt.as_mut() {
          a.abandon_recording();
        }
        // Detach; this task is finishing on its own.
        play.ticker = None;
        break;
      }
    }
  }
}

#[derive(Debug)]
pub enum Screen {
  Authoring(AuthoringScreen),
  Review(ReviewSession),
  Student(StudentPlay),
}

impl Screen {
  pub fn name(&self) -> &'static str {
    match self {
      Screen::Authoring(_) => "authoring",
      Screen::Review(_) => "review",
      Screen::Student(_) => "student",
    }
  }
}

#[derive(Debug)]
pub struct Session {
  pub id: Uuid,
  api_key: Option<String>,
  pub screen: Screen,
  last_active: tokio::time::Instant,
}

impl Session {
  pub fn new(catalog: &Catalog) -> Self {
    Self {
      id: Uuid::new_v4(),
      api_key: None,
      screen: Screen::Authoring(AuthoringScreen {
        form: AuthoringForm::with_defaults(catalog, None),
        generating: false,
        error: None,
      }),
      last_active: tokio::time::Instant::now(),
    }
  }

  pub fn touch(&mut self) {
    self.last_active = tokio::time::Instant::now();
  }

  /// Idle sessions are swept, except while a quest is being played.
  pub fn is_idle(&self, ttl: Duration) -> bool {
    let playing = matches!(&self.screen, Screen::Student(p) if p.is_ticker_running());
    !playing && self.last_active.elapsed() >= ttl
  }

  pub fn api_key(&self) -> Option<&str> {
    self.api_key.as_deref()
  }

  pub fn has_api_key(&self) -> bool {
    self.api_key.is_some()
  }

  pub fn authoring_mut(&mut self) -> Result<&mut AuthoringScreen, FlowError> {
    match &mut self.screen {
      Screen::Authoring(a) => Ok(a),
      _ => Err(FlowError::WrongScreen { expected: "authoring" }),
    }
  }

  pub fn review_mut(&mut self) -> Result<&mut ReviewSession, FlowError> {
    match &mut self.screen {
      Screen::Review(r) => Ok(r),
      _ => Err(FlowError::WrongScreen { expected: "review" }),
    }
  }

  pub fn play_mut(&mut self) -> Result<&mut StudentPlay, FlowError> {
    match &mut self.screen {
      Screen::Student(p) => Ok(p),
      _ => Err(FlowError::WrongScreen { expected: "student" }),
    }
  }

  /// Validate the form and mark generation as running. Returns what the gateway needs.
  pub fn begin_draft(&mut self, form: AuthoringForm) -> Result<(String, QuestContext), AppError> {
    let screen = self.authoring_mut()?;
    if screen.generating {
      return Err(FlowError::GenerationInProgress.into());
    }
    screen.form = form;
    let (api_key, ctx) = match screen.form.resolve() {
      Ok(ok) => ok,
      Err(e) => {
        screen.error = Some(e.to_string());
        return Err(e.into());
      }
    };
    screen.generating = true;
    screen.error = None;
    self.api_key = Some(api_key.clone());
    Ok((api_key, ctx))
  }

  /// Apply the generation outcome: a draft moves to review, a failure stays on the form.
  pub fn finish_draft(&mut self, ctx: QuestContext, outcome: Result<Quest, GatewayError>) -> Result<(), AppError> {
    let screen = match &mut self.screen {
      Screen::Authoring(a) if a.generating => a,
      other => {
        warn!(target: "quest", session_id = %self.id, screen = other.name(), "Discarding stale quest draft");
        return Err(FlowError::WrongScreen { expected: "authoring" }.into());
      }
    };
    screen.generating = false;
    match outcome {
      Ok(quest) => {
        self.screen = Screen::Review(ReviewSession::new(quest, ctx));
        info!(target: "quest", session_id = %self.id, "Draft ready for review");
        Ok(())
      }
      Err(e) => {
        screen.error = Some(e.to_string());
        Err(e.into())
      }
    }
  }

  /// Review → student play with the frozen quest.
  pub fn finalize(&mut self) -> Result<(), FlowError> {
    self.review_mut()?;
    let placeholder = Screen::Authoring(self.blank_authoring());
    let Screen::Review(review) = std::mem::replace(&mut self.screen, placeholder) else {
      return Err(FlowError::WrongScreen { expected: "review" });
    };
    self.screen = Screen::Student(StudentPlay::new(Arc::new(review.finalize())));
    Ok(())
  }

  pub fn cancel_review(&mut self) -> Result<(), FlowError> {
    self.review_mut()?;
    self.reset();
    Ok(())
  }

  /// Back to an empty form. Dropping the play screen aborts its ticker.
  pub fn reset(&mut self) {
    self.screen = Screen::Authoring(self.blank_authoring());
    info!(target: "quest", session_id = %self.id, "Session reset");
  }

  fn blank_authoring(&self) -> AuthoringScreen {
    AuthoringScreen {
      form: AuthoringForm::with_defaults(&Catalog::builtin(), self.api_key.as_deref()),
      generating: false,
      error: None,
    }
  }
}
