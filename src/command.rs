//! 交互式命令解析与任务展示
//!
//! ```text
//! add <goal> [priority:N] [deadline:RFC3339] [depends:1,2] [every:N:unit]
//! list | show <id> | activate <id> | complete <id> | delete <id>
//! auto on|off | tick | status | help | quit
//! ```

use crate::tasks::{RecurrenceUnit, Task, TaskId, TaskSpec, TaskStatus};
use chrono::{DateTime, Utc};

pub const HELP: &str = "\
Commands:
  add <goal> [priority:N] [deadline:RFC3339] [depends:1,2] [every:N:unit]
  list                 list all tasks
  show <id>            show one task with its plan
  activate <id>        start working on a task now
  complete <id>        mark a task completed
  delete <id>          cancel a task
  auto on|off          toggle autonomous mode
  tick                 run one scheduling tick now
  status               show agent status
  quit                 exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Add(TaskSpec),
    List,
    Show(TaskId),
    Activate(TaskId),
    Complete(TaskId),
    Delete(TaskId),
    Auto(bool),
    Tick,
    Status,
    Help,
    Quit,
}

/// 解析一行输入，空行返回 `Ok(None)`
pub fn parse(line: &str) -> Result<Option<ReplCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_lowercase().as_str() {
        "add" => ReplCommand::Add(parse_add(rest)?),
        "list" | "ls" => ReplCommand::List,
        "show" => ReplCommand::Show(parse_id(rest)?),
        "activate" => ReplCommand::Activate(parse_id(rest)?),
        "complete" | "done" => ReplCommand::Complete(parse_id(rest)?),
        "delete" | "rm" => ReplCommand::Delete(parse_id(rest)?),
        "auto" => match rest.to_lowercase().as_str() {
            "on" => ReplCommand::Auto(true),
            "off" => ReplCommand::Auto(false),
            other => return Err(format!("expected 'auto on' or 'auto off', got '{}'", other)),
        },
        "tick" => ReplCommand::Tick,
        "status" => ReplCommand::Status,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

fn parse_add(rest: &str) -> Result<TaskSpec, String> {
    let mut goal = Vec::new();
    let mut spec = TaskSpec::new("");

    for token in rest.split_whitespace() {
        let Some((key, value)) = token.split_once(':') else {
            goal.push(token);
            continue;
        };
        match key.to_lowercase().as_str() {
            "priority" | "p" => {
                let priority = value
                    .parse()
                    .map_err(|_| format!("invalid priority '{}'", value))?;
                spec = spec.priority(priority);
            }
            "deadline" => {
                let deadline = DateTime::parse_from_rfc3339(value)
                    .map_err(|e| format!("invalid deadline '{}': {}", value, e))?;
                spec = spec.deadline(deadline.with_timezone(&Utc));
            }
            "depends" => {
                for id in value.split(',').filter(|s| !s.is_empty()) {
                    spec = spec.depends_on(parse_id(id)?);
                }
            }
            "every" => {
                let (interval, unit) = value
                    .split_once(':')
                    .ok_or_else(|| format!("expected every:N:unit, got '{}'", token))?;
                let interval = interval
                    .parse()
                    .map_err(|_| format!("invalid interval '{}'", interval))?;
                let unit = RecurrenceUnit::parse(unit)
                    .ok_or_else(|| format!("unknown recurrence unit '{}'", unit))?;
                spec = spec.every(interval, unit);
            }
            // 目标文本里本身带冒号，如 "note: buy milk"
            _ => goal.push(token),
        }
    }

    if goal.is_empty() {
        return Err("usage: add <goal> [priority:N] [deadline:RFC3339] [depends:1,2] [every:N:unit]".into());
    }
    spec.description = goal.join(" ");
    Ok(spec)
}

fn parse_id(raw: &str) -> Result<TaskId, String> {
    let raw = raw.trim();
    raw.trim_start_matches('#')
        .parse()
        .map(TaskId)
        .map_err(|_| format!("invalid task id '{}'", raw))
}

/// 列表中的一行
pub fn task_line(task: &Task) -> String {
    let mut line = format!(
        "{:<5} [{}] p{} {}",
        task.id.to_string(),
        task.status,
        task.priority,
        task.description
    );
    if let Some(deadline) = task.deadline {
        line.push_str(&format!(" (due {})", deadline.format("%Y-%m-%d %H:%M")));
    }
    if !task.dependencies.is_empty() {
        let deps: Vec<String> = task.dependencies.iter().map(TaskId::to_string).collect();
        line.push_str(&format!(" after {}", deps.join(",")));
    }
    if let Some(rule) = task.recurrence {
        line.push_str(&format!(" every {} {:?}", rule.interval, rule.unit).to_lowercase());
    }
    if task.status == TaskStatus::Pending
        && let Some(due) = task.due_at
    {
        line.push_str(&format!(" [not before {}]", due.format("%Y-%m-%d %H:%M")));
    }
    line
}

/// 单个任务的详细信息，含计划和执行结果
pub fn task_detail(task: &Task) -> String {
    let mut out = task_line(task);
    out.push_str(&format!("\n  created: {}", task.created_at.to_rfc3339()));
    if let Some(at) = task.last_run_at {
        out.push_str(&format!("\n  last run: {}", at.to_rfc3339()));
    }
    for (index, step) in task.plan.iter().enumerate() {
        let marker = if index < task.current_step_index {
            "x"
        } else if index == task.current_step_index && task.status.is_active() {
            ">"
        } else {
            " "
        };
        out.push_str(&format!("\n  [{}] {}. {}", marker, index + 1, step));
        if let Some(result) = task.results.get(index) {
            out.push_str(&format!("\n        -> {}", result));
        }
    }
    if let Some(error) = &task.last_error {
        out.push_str(&format!("\n  last error: {}", error));
    }
    if let Some(reflection) = &task.reflection {
        out.push_str(&format!("\n  reflection: {}", reflection));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_add_with_options() {
        let command = parse("add Research Rust async priority:4 depends:1,#2 every:1:week")
            .unwrap()
            .unwrap();
        let expected = TaskSpec::new("Research Rust async")
            .priority(4)
            .depends_on(TaskId(1))
            .depends_on(TaskId(2))
            .every(1, RecurrenceUnit::Week);
        assert_eq!(command, ReplCommand::Add(expected));
    }

    #[test]
    fn test_parse_deadline() {
        let Some(ReplCommand::Add(spec)) =
            parse("add ship release deadline:2025-06-01T12:00:00+02:00").unwrap()
        else {
            panic!("expected add");
        };
        assert_eq!(
            spec.deadline,
            Some(Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(spec.description, "ship release");
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("  ").unwrap(), None);
        assert_eq!(parse("list").unwrap(), Some(ReplCommand::List));
        assert_eq!(parse("show #3").unwrap(), Some(ReplCommand::Show(TaskId(3))));
        assert_eq!(parse("delete 7").unwrap(), Some(ReplCommand::Delete(TaskId(7))));
        assert_eq!(parse("auto ON").unwrap(), Some(ReplCommand::Auto(true)));
        assert_eq!(parse("quit").unwrap(), Some(ReplCommand::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("add").is_err());
        assert!(parse("add x priority:high").is_err());
        assert!(parse("add x every:2:fortnight").is_err());
        assert!(parse("show abc").is_err());
        assert!(parse("auto maybe").is_err());
        assert!(parse("fly").is_err());
    }

    #[test]
    fn test_task_line() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let mut store = crate::tasks::TaskStore::new();
        let a = store.add(TaskSpec::new("A"), now).unwrap();
        let b = store
            .add(TaskSpec::new("write notes").priority(3).depends_on(a), now)
            .unwrap();
        let line = task_line(store.get(b).unwrap());
        assert_eq!(line, "#2    [Pending] p3 write notes after #1");
    }
}
