use {
  std::{
    sync::{atomic::{AtomicU64, Ordering}, Arc},
    time::Instant,
  },
  crate::errors::{Error, Result},
};

/// Millisecond time source.
pub trait Clock: Send + Sync + std::fmt::Debug {
  fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
  origin: Instant,
}

impl SystemClock {
  pub fn new() -> Self {
    SystemClock { origin: Instant::now() }
  }
}

impl Default for SystemClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for SystemClock {
  fn now_millis(&self) -> u64 {
    self.origin.elapsed().as_millis() as u64
  }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
  now: Arc<AtomicU64>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn advance(&self, millis: u64) {
    self.now.fetch_add(millis, Ordering::SeqCst);
  }
  pub fn set(&self, millis: u64) {
    self.now.store(millis, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now_millis(&self) -> u64 {
    self.now.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationState {
  NotStarted,
  Running,
  Stopped,
}

/// Deadline bookkeeping for one command set.
#[derive(Debug)]
pub struct UpdateEvaluationContext {
  clock: Arc<dyn Clock>,
  command_timeout_ms: u64,
  global_timeout_ms: u64,
  timeout_ms: u64,
  state: EvaluationState,
  started_at: u64,
  stopped_at: u64,
}

impl UpdateEvaluationContext {
  pub fn new(command_timeout_ms: u64, global_timeout_ms: u64) -> Self {
    Self::with_clock(command_timeout_ms, global_timeout_ms, Arc::new(SystemClock::new()))
  }
  pub fn with_clock(command_timeout_ms: u64, global_timeout_ms: u64, clock: Arc<dyn Clock>) -> Self {
    UpdateEvaluationContext {
      clock,
      command_timeout_ms,
      global_timeout_ms,
      timeout_ms: 0,
      state: EvaluationState::NotStarted,
      started_at: 0,
      stopped_at: 0,
    }
  }

  pub fn state(&self) -> EvaluationState {
    self.state
  }

  /// Zero on either side means that side sets no limit.
  pub fn effective_timeout(command_timeout_ms: u64, global_timeout_ms: u64) -> u64 {
    match (command_timeout_ms, global_timeout_ms) {
      (0, global) => global,
      (command, 0) => command,
      (command, global) => command.min(global),
    }
  }

  /// The timeout computed at `start`, `0` when unlimited.
  pub fn timeout(&self) -> u64 {
    self.timeout_ms
  }

  pub fn start(&mut self) -> Result<()> {
    if self.state != EvaluationState::NotStarted {
      return Err(Error::InvalidState(format!("cannot start an evaluation that is {:?}", self.state)))
    }
    self.timeout_ms = Self::effective_timeout(self.command_timeout_ms, self.global_timeout_ms);
    self.started_at = self.clock.now_millis();
    self.state = EvaluationState::Running;
    Ok(())
  }

  /// Freezes the elapsed time. Stopping twice keeps the first reading.
  pub fn stop(&mut self) {
    if self.state == EvaluationState::Running {
      self.stopped_at = self.clock.now_millis();
      self.state = EvaluationState::Stopped;
    }
  }

  pub fn elapsed(&self) -> Result<u64> {
    match self.state {
      EvaluationState::NotStarted => Err(Error::InvalidState("evaluation has not been started".to_string())),
      EvaluationState::Running => Ok(self.clock.now_millis().saturating_sub(self.started_at)),
      EvaluationState::Stopped => Ok(self.stopped_at.saturating_sub(self.started_at)),
    }
  }

  pub fn check_timeout(&self) -> Result<()> {
    if self.state != EvaluationState::Running || self.timeout_ms == 0 {
      return Ok(())
    }
    let elapsed = self.elapsed()?;
    if elapsed > self.timeout_ms {
      return Err(Error::TimedOut { timeout_ms: self.timeout_ms, elapsed_ms: elapsed })
    }
    Ok(())
  }

  /// Time left before the deadline: `0` when unlimited, otherwise never
  /// less than 1.
  pub fn remaining(&self) -> Result<u64> {
    if self.timeout_ms == 0 {
      return Ok(0)
    }
    Ok(self.timeout_ms.saturating_sub(self.elapsed()?).max(1))
  }
}
