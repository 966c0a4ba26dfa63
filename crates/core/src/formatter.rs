//! Observation rendering for agents that consume text.

use qbench_types::{Observation, ScheduledTask, Task};
use serde_json::{json, Value};
use std::fmt::Write;

const RULE_WIDTH: usize = 70;

/// Instructions prepended to every observation sent to a remote agent.
///
/// Remote agents are treated as stateless, so the rules travel with each
/// step.
pub const TASK_PROMPT: &str = "\
You control an online queue. Tasks arrive over time and must be scheduled \
into future steps, each of which has a limited number of slots.

Reply with JSON actions, either one object or a list:
  {\"type\": \"schedule\", \"task_id\": \"t1\", \"step\": 5}    assign a pending task
  {\"type\": \"reschedule\", \"task_id\": \"t1\", \"step\": 8}  move a scheduled task
  {\"type\": \"reject\", \"task_id\": \"r3\"}                 refuse a ROUTINE task
  {\"type\": \"cancel\", \"task_id\": \"t4\"}                 withdraw a scheduled task
  {\"type\": \"noop\"}                                    do nothing

Rules:
  - target steps must be after the current step and before the horizon
  - a step never holds more tasks than its capacity
  - a task completes when time reaches its scheduled step
  - URGENT tasks must complete by their deadline and can never be rejected
  - ROUTINE tasks completed by their deadline raise your SLA score";

/// Converts observations into agent-readable text or compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservationFormatter;

impl ObservationFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Render a human-readable queue status report.
    ///
    /// Every section is always present; empty sections read `none`.
    pub fn format_text(&self, obs: &Observation) -> String {
        let mut out = String::new();
        let rule = "=".repeat(RULE_WIDTH);

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "QUEUE STATUS - Step {} of {}", obs.time, obs.horizon);
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out);
        let _ = writeln!(out, "CAPACITY: {} slots per step", obs.capacity_per_step);
        let _ = writeln!(out);

        write_tasks(&mut out, "NEW ARRIVALS", obs.arrivals.iter());
        write_ids(&mut out, "CANCELLATIONS", obs.cancellations.iter());

        let mut pending: Vec<&Task> = obs.pending.iter().collect();
        pending.sort_by(|a, b| (a.deadline, a.priority).cmp(&(b.deadline, b.priority)));
        write_tasks(&mut out, "PENDING TASKS", pending.into_iter());

        write_scheduled(&mut out, &obs.scheduled);
        write_ids(&mut out, "COMPLETED THIS STEP", obs.completed_this_step.iter());
        write_ids(&mut out, "MISSED THIS STEP", obs.missed_this_step.iter());

        let _ = write!(out, "{}", rule);
        out
    }

    /// Render the observation as compact structured JSON.
    pub fn format_compact(&self, obs: &Observation) -> Value {
        let brief = |t: &Task| {
            json!({
                "id": t.id,
                "priority": t.priority,
                "arrival_time": t.arrival_time,
                "deadline": t.deadline,
            })
        };
        json!({
            "time": obs.time,
            "horizon": obs.horizon,
            "capacity": obs.capacity_per_step,
            "arrivals": obs.arrivals.iter().map(brief).collect::<Vec<_>>(),
            "cancellations": obs.cancellations,
            "pending": obs.pending.iter().map(brief).collect::<Vec<_>>(),
            "scheduled": obs.scheduled.iter().map(|s| json!({
                "id": s.task.id,
                "step": s.step,
                "priority": s.task.priority,
                "deadline": s.task.deadline,
            })).collect::<Vec<_>>(),
            "completed_this_step": obs.completed_this_step,
            "missed_this_step": obs.missed_this_step,
        })
    }

    /// Task prompt followed by the text report.
    pub fn format_prompt(&self, obs: &Observation) -> String {
        format!("{}\n\n{}", TASK_PROMPT, self.format_text(obs))
    }
}

fn task_line(task: &Task) -> String {
    format!(
        "  {} [{}] arrived: {}, deadline: {}",
        task.id,
        task.priority.as_str().to_uppercase(),
        task.arrival_time,
        task.deadline
    )
}

fn write_tasks<'a>(out: &mut String, title: &str, tasks: impl ExactSizeIterator<Item = &'a Task>) {
    if tasks.len() == 0 {
        let _ = writeln!(out, "{}: none", title);
    } else {
        let _ = writeln!(out, "{} ({}):", title, tasks.len());
        for task in tasks {
            let _ = writeln!(out, "{}", task_line(task));
        }
    }
    let _ = writeln!(out);
}

fn write_ids<'a, T: std::fmt::Display + 'a>(
    out: &mut String,
    title: &str,
    ids: impl ExactSizeIterator<Item = &'a T>,
) {
    if ids.len() == 0 {
        let _ = writeln!(out, "{}: none", title);
    } else {
        let _ = writeln!(out, "{} ({}):", title, ids.len());
        for id in ids {
            let _ = writeln!(out, "  {}", id);
        }
    }
    let _ = writeln!(out);
}

fn write_scheduled(out: &mut String, scheduled: &[ScheduledTask]) {
    if scheduled.is_empty() {
        let _ = writeln!(out, "SCHEDULED TASKS: none");
        let _ = writeln!(out);
        return;
    }

    let _ = writeln!(out, "SCHEDULED TASKS ({}):", scheduled.len());
    let mut sorted: Vec<&ScheduledTask> = scheduled.iter().collect();
    sorted.sort_by(|a, b| (a.step, &a.task.id).cmp(&(b.step, &b.task.id)));

    // Slot indices are assigned per step in id order.
    let mut slot_index = 0;
    let mut current_step = None;
    for entry in sorted {
        if current_step != Some(entry.step) {
            current_step = Some(entry.step);
            slot_index = 0;
        }
        let _ = writeln!(
            out,
            "  {} -> slot [{}, {}] [{}] arrived: {}, deadline: {}",
            entry.task.id,
            entry.step,
            slot_index,
            entry.task.priority.as_str().to_uppercase(),
            entry.task.arrival_time,
            entry.task.deadline
        );
        slot_index += 1;
    }
    let _ = writeln!(out);
}
