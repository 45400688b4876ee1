use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::{CancelHandle, ExecutionLimits};
use crate::report::ConsoleMessage;
use crate::runtime_values::{PromiseRef, PromiseState, ReactionKind, Value};
use crate::{AbortReason, Error, Result};

/// Intervals are re-armed at most this many times.
pub(crate) const MAX_INTERVAL_REPEATS: usize = 100;

#[derive(Debug, Clone)]
pub(crate) struct ScheduledTask {
    pub(crate) id: i64,
    pub(crate) due_at: i64,
    pub(crate) order: i64,
    pub(crate) interval_ms: Option<i64>,
    pub(crate) repeats: usize,
    pub(crate) callback: Value,
    pub(crate) args: Vec<Value>,
}

pub(crate) enum Microtask {
    Callback {
        callback: Value,
        args: Vec<Value>,
    },
    Reaction {
        kind: ReactionKind,
        derived: PromiseRef,
        settled: PromiseState,
    },
}

pub(crate) struct SchedulerState {
    pub(crate) task_queue: Vec<ScheduledTask>,
    pub(crate) microtask_queue: VecDeque<Microtask>,
    pub(crate) now_ms: i64,
    pub(crate) timer_step_limit: usize,
    pub(crate) timer_steps: usize,
    /// Timer whose callback is executing; clearing it cancels the re-arm.
    running: Option<(i64, bool)>,
    next_timer_id: i64,
    next_task_order: i64,
}

impl SchedulerState {
    pub(crate) fn new(timer_step_limit: usize) -> Self {
        Self {
            task_queue: Vec::new(),
            microtask_queue: VecDeque::new(),
            now_ms: 0,
            timer_step_limit,
            timer_steps: 0,
            running: None,
            next_timer_id: 1,
            next_task_order: 0,
        }
    }

    pub(crate) fn schedule(
        &mut self,
        callback: Value,
        args: Vec<Value>,
        delay_ms: i64,
        interval: bool,
    ) -> i64 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        let delay_ms = delay_ms.max(0);
        let order = self.allocate_order();
        self.task_queue.push(ScheduledTask {
            id,
            due_at: self.now_ms.saturating_add(delay_ms),
            order,
            interval_ms: interval.then_some(delay_ms),
            repeats: 0,
            callback,
            args,
        });
        id
    }

    pub(crate) fn reschedule(&mut self, mut task: ScheduledTask) {
        let Some(interval_ms) = task.interval_ms else {
            return;
        };
        if task.repeats + 1 >= MAX_INTERVAL_REPEATS {
            return;
        }
        task.repeats += 1;
        task.due_at = self.now_ms.saturating_add(interval_ms.max(1));
        task.order = self.allocate_order();
        self.task_queue.push(task);
    }

    fn allocate_order(&mut self) -> i64 {
        let order = self.next_task_order;
        self.next_task_order += 1;
        order
    }

    pub(crate) fn clear(&mut self, id: i64) {
        self.task_queue.retain(|task| task.id != id);
        if let Some((running, cleared)) = &mut self.running {
            if *running == id {
                *cleared = true;
            }
        }
    }

    pub(crate) fn begin_task(&mut self, id: i64) {
        self.running = Some((id, false));
    }

    /// Ends the running task and reports whether it was cleared meanwhile.
    pub(crate) fn finish_task(&mut self) -> bool {
        self.running.take().is_some_and(|(_, cleared)| cleared)
    }

    /// Removes the next due task in (due time, registration order) and
    /// advances the virtual clock to it.
    pub(crate) fn pop_next_task(&mut self) -> Option<ScheduledTask> {
        let (idx, _) = self
            .task_queue
            .iter()
            .enumerate()
            .min_by_key(|(_, task)| (task.due_at, task.order))?;
        let task = self.task_queue.remove(idx);
        self.now_ms = self.now_ms.max(task.due_at);
        Some(task)
    }

    pub(crate) fn note_timer_step(&mut self) -> Result<()> {
        self.timer_steps += 1;
        if self.timer_steps > self.timer_step_limit {
            return Err(Error::Aborted(AbortReason::TimerLimit(self.timer_step_limit)));
        }
        Ok(())
    }
}

/// Bounded capture of `console.*` output.
pub(crate) struct ConsoleState {
    pub(crate) messages: VecDeque<ConsoleMessage>,
    pub(crate) limit: usize,
    pub(crate) dropped: usize,
}

impl ConsoleState {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            limit,
            dropped: 0,
        }
    }

    pub(crate) fn push(&mut self, level: &str, text: String) {
        if self.limit == 0 {
            self.dropped += 1;
            return;
        }
        while self.messages.len() >= self.limit {
            self.messages.pop_front();
            self.dropped += 1;
        }
        self.messages.push_back(ConsoleMessage {
            level: level.to_string(),
            text,
        });
    }
}

/// Step, depth, wall clock and cancellation accounting for one run.
pub(crate) struct ExecutionBudget {
    pub(crate) steps: u64,
    max_steps: u64,
    pub(crate) call_depth: usize,
    pub(crate) max_call_depth: usize,
    started: Instant,
    wall_clock: Option<Duration>,
    cancel: CancelHandle,
}

impl ExecutionBudget {
    pub(crate) fn new(limits: &ExecutionLimits, cancel: CancelHandle) -> Self {
        Self {
            steps: 0,
            max_steps: limits.max_steps,
            call_depth: 0,
            max_call_depth: limits.max_call_depth,
            started: Instant::now(),
            wall_clock: limits.wall_clock,
            cancel,
        }
    }

    pub(crate) fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(Error::Aborted(AbortReason::StepLimit(self.max_steps)));
        }
        if self.steps % 1024 == 0 {
            self.check_interrupts()?;
        }
        Ok(())
    }

    /// Cancellation and wall clock check, run at every interception point.
    pub(crate) fn check_interrupts(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Aborted(AbortReason::Cancelled));
        }
        if let Some(limit) = self.wall_clock {
            if self.started.elapsed() > limit {
                return Err(Error::Aborted(AbortReason::WallClock(limit)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_run_in_due_then_registration_order() {
        let mut scheduler = SchedulerState::new(10);
        let late = scheduler.schedule(Value::Undefined, Vec::new(), 50, false);
        let first = scheduler.schedule(Value::Undefined, Vec::new(), 0, false);
        let second = scheduler.schedule(Value::Undefined, Vec::new(), 0, false);
        let order = std::iter::from_fn(|| scheduler.pop_next_task())
            .map(|task| task.id)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![first, second, late]);
        assert_eq!(scheduler.now_ms, 50);
    }

    #[test]
    fn cleared_tasks_never_run() {
        let mut scheduler = SchedulerState::new(10);
        let id = scheduler.schedule(Value::Undefined, Vec::new(), 5, false);
        scheduler.clear(id);
        assert!(scheduler.pop_next_task().is_none());
    }

    #[test]
    fn intervals_stop_after_repeat_cap() {
        let mut scheduler = SchedulerState::new(10_000);
        scheduler.schedule(Value::Undefined, Vec::new(), 10, true);
        let mut runs = 0;
        while let Some(task) = scheduler.pop_next_task() {
            runs += 1;
            scheduler.reschedule(task);
        }
        assert_eq!(runs, MAX_INTERVAL_REPEATS);
    }

    #[test]
    fn timer_step_limit_aborts() {
        let mut scheduler = SchedulerState::new(2);
        assert!(scheduler.note_timer_step().is_ok());
        assert!(scheduler.note_timer_step().is_ok());
        assert_eq!(
            scheduler.note_timer_step(),
            Err(Error::Aborted(AbortReason::TimerLimit(2)))
        );
    }

    #[test]
    fn console_buffer_keeps_newest_messages() {
        let mut console = ConsoleState::new(2);
        for idx in 0..5 {
            console.push("log", format!("m{idx}"));
        }
        let kept = console
            .messages
            .iter()
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(kept, vec!["m3", "m4"]);
        assert_eq!(console.dropped, 3);
    }

    #[test]
    fn step_budget_aborts_past_limit() {
        let limits = ExecutionLimits {
            max_steps: 3,
            ..ExecutionLimits::default()
        };
        let mut budget = ExecutionBudget::new(&limits, CancelHandle::new());
        for _ in 0..3 {
            assert!(budget.tick().is_ok());
        }
        assert_eq!(
            budget.tick(),
            Err(Error::Aborted(AbortReason::StepLimit(3)))
        );
    }

    #[test]
    fn cancellation_is_observed() {
        let cancel = CancelHandle::new();
        let budget = ExecutionBudget::new(&ExecutionLimits::default(), cancel.clone());
        assert!(budget.check_interrupts().is_ok());
        cancel.cancel();
        assert_eq!(
            budget.check_interrupts(),
            Err(Error::Aborted(AbortReason::Cancelled))
        );
    }
}
