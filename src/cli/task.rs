//! devday task command implementation

use serde::Serialize;

use crate::error::Result;
use crate::notify::get_completion_status;
use crate::output::{format_duration, HumanOutput};
use crate::task::{
    DatesPatch, EisenhowerQuad, NewTask, PomodoroPatch, RefinementPatch, Subtask, Task,
    TaskPatch, TaskStatus,
};

use super::{parse_datetime, parse_optional_datetime, Context, SubtaskCommands, TaskCommands};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskList<'a> {
    tasks: Vec<&'a Task>,
    total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubtaskReport<'a> {
    task_id: &'a str,
    subtask: &'a Subtask,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemovedReport<'a> {
    id: &'a str,
    removed: bool,
}

pub(super) fn run(ctx: &Context, cmd: TaskCommands) -> Result<()> {
    match cmd {
        TaskCommands::New {
            code,
            title,
            status,
            start,
            due,
        } => run_new(ctx, code, title, &status, start, due),
        TaskCommands::List { status } => run_list(ctx, status.as_deref()),
        TaskCommands::Show { task } => run_show(ctx, &task),
        TaskCommands::Update {
            task,
            code,
            title,
            status,
            quad,
            start,
            due,
            goal,
            analysis,
            testing,
            estimate,
        } => {
            let patch = build_patch(UpdateArgs {
                code,
                title,
                status,
                quad,
                start,
                due,
                goal,
                analysis,
                testing,
                estimate,
            })?;
            run_update(ctx, &task, patch)
        }
        TaskCommands::Delete { task } => run_delete(ctx, &task),
        TaskCommands::Note { task, content } => run_note(ctx, &task, &content),
        TaskCommands::Subtask(cmd) => run_subtask(ctx, cmd),
    }
}

fn run_new(
    ctx: &Context,
    code: String,
    title: String,
    status: &str,
    start: Option<String>,
    due: Option<String>,
) -> Result<()> {
    let mut input = NewTask::new(code, title, status.parse::<TaskStatus>()?);
    input.start_date = start.as_deref().map(parse_datetime).transpose()?;
    input.due_date = due.as_deref().map(parse_datetime).transpose()?;

    let ws = ctx.open()?;
    let task = ws.tasks()?.create_task(input)?;

    let mut human = HumanOutput::new(format!("Task created: {}", task.code));
    human.push_summary("id", task.id.clone());
    human.push_summary("title", task.title.clone());
    human.push_summary("status", task.status.to_string());
    if !task.refinement.is_complete() {
        human.push_next_step(format!(
            "devday task update {} --goal \"...\" --analysis \"...\" --testing \"...\"",
            task.code
        ));
    }
    ctx.save(&ws, &mut human);
    ctx.emit("task new", &task, &human)
}

fn run_list(ctx: &Context, status: Option<&str>) -> Result<()> {
    let status = status.map(str::parse::<TaskStatus>).transpose()?;
    let ws = ctx.open()?;
    let registry = ws.tasks()?;
    let tasks = registry.list(status);

    let header = match status {
        Some(status) => format!("Tasks ({status}): {}", tasks.len()),
        None => format!("Tasks: {}", tasks.len()),
    };
    let mut human = HumanOutput::new(header);
    for task in &tasks {
        human.push_detail(task_line(task));
    }
    if registry.is_empty() {
        human.push_next_step("devday task new <code> <title>");
    }

    let report = TaskList {
        total: tasks.len(),
        tasks,
    };
    ctx.emit("task list", &report, &human)
}

fn run_show(ctx: &Context, input: &str) -> Result<()> {
    let ws = ctx.open()?;
    let registry = ws.tasks()?;
    let id = registry.resolve(input)?;
    let Some(task) = registry.get(&id) else {
        return Err(crate::error::Error::not_found("task", id));
    };

    let mut human = HumanOutput::new(format!("{} {}", task.code, task.title));
    human.push_summary("id", task.id.clone());
    human.push_summary("status", task.status.to_string());
    human.push_summary("deadline", get_completion_status(task).to_string());
    if let Some(due) = task.dates.due_date {
        human.push_summary("due", due.format("%Y-%m-%d").to_string());
    }
    if task.eisenhower_quad != EisenhowerQuad::None {
        human.push_summary("quadrant", format!("{:?}", task.eisenhower_quad));
    }
    human.push_summary(
        "pomodoros",
        format!("{}/{}", task.pomodoro.actual, task.pomodoro.estimated),
    );
    human.push_summary("time spent", format_duration(task.pomodoro.time_spent));
    human.push_summary(
        "refined",
        if task.refinement.is_complete() { "yes" } else { "no" },
    );

    for sub in &task.subtasks {
        let mark = if sub.completed { "x" } else { " " };
        human.push_detail(format!("[{mark}] {} ({})", sub.title, sub.id));
    }
    for note in &task.notes {
        human.push_detail(format!(
            "note {}: {}",
            note.created_at.format("%Y-%m-%d %H:%M"),
            note.content
        ));
    }
    for entry in &task.history {
        human.push_detail(format!(
            "{} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.action
        ));
    }

    ctx.emit("task show", task, &human)
}

struct UpdateArgs {
    code: Option<String>,
    title: Option<String>,
    status: Option<String>,
    quad: Option<String>,
    start: Option<String>,
    due: Option<String>,
    goal: Option<String>,
    analysis: Option<String>,
    testing: Option<String>,
    estimate: Option<u32>,
}

fn build_patch(args: UpdateArgs) -> Result<TaskPatch> {
    let dates = if args.start.is_some() || args.due.is_some() {
        Some(DatesPatch {
            start_date: args.start.as_deref().map(parse_optional_datetime).transpose()?,
            due_date: args.due.as_deref().map(parse_optional_datetime).transpose()?,
        })
    } else {
        None
    };

    let refinement = if args.goal.is_some() || args.analysis.is_some() || args.testing.is_some()
    {
        Some(RefinementPatch {
            goal: args.goal,
            technical_analysis: args.analysis,
            testing_strategy: args.testing,
        })
    } else {
        None
    };

    Ok(TaskPatch {
        code: args.code,
        title: args.title,
        status: args
            .status
            .as_deref()
            .map(str::parse::<TaskStatus>)
            .transpose()?,
        eisenhower_quad: args
            .quad
            .as_deref()
            .map(str::parse::<EisenhowerQuad>)
            .transpose()?,
        dates,
        refinement,
        pomodoro: args.estimate.map(|estimated| PomodoroPatch {
            estimated: Some(estimated),
            ..PomodoroPatch::default()
        }),
    })
}

fn run_update(ctx: &Context, input: &str, patch: TaskPatch) -> Result<()> {
    let ws = ctx.open()?;
    let task = {
        let mut registry = ws.tasks()?;
        let id = registry.resolve(input)?;
        registry.update_task(&id, patch)?
    };

    let mut human = HumanOutput::new(format!("Task updated: {}", task.code));
    human.push_summary("status", task.status.to_string());
    if let Some(entry) = task.history.first() {
        human.push_summary("last change", entry.action.clone());
    }
    ctx.save(&ws, &mut human);
    ctx.emit("task update", &task, &human)
}

fn run_delete(ctx: &Context, input: &str) -> Result<()> {
    let ws = ctx.open()?;
    let task = {
        let mut registry = ws.tasks()?;
        let id = registry.resolve(input)?;
        registry.delete_task(&id)?
    };

    let mut human = HumanOutput::new(format!("Task deleted: {}", task.code));
    human.push_summary("id", task.id.clone());
    ctx.save(&ws, &mut human);
    ctx.emit(
        "task delete",
        &RemovedReport {
            id: &task.id,
            removed: true,
        },
        &human,
    )
}

fn run_note(ctx: &Context, input: &str, content: &str) -> Result<()> {
    let ws = ctx.open()?;
    let (code, note) = {
        let mut registry = ws.tasks()?;
        let id = registry.resolve(input)?;
        let note = registry.add_note(&id, content)?;
        let code = registry.get(&id).map(|task| task.code.clone()).unwrap_or(id);
        (code, note)
    };

    let mut human = HumanOutput::new(format!("Note added to {code}"));
    human.push_summary("id", note.id.clone());
    ctx.save(&ws, &mut human);
    ctx.emit("task note", &note, &human)
}

fn run_subtask(ctx: &Context, cmd: SubtaskCommands) -> Result<()> {
    let ws = ctx.open()?;
    let mut registry = ws.tasks()?;

    match cmd {
        SubtaskCommands::Add { task, title } => {
            let id = registry.resolve(&task)?;
            let subtask = registry.add_subtask(&id, &title)?;
            drop(registry);

            let mut human = HumanOutput::new(format!("Subtask added: {}", subtask.title));
            human.push_summary("id", subtask.id.clone());
            human.push_next_step(format!("devday day goal add {id} --subtask {}", subtask.id));
            ctx.save(&ws, &mut human);
            ctx.emit(
                "task subtask",
                &SubtaskReport {
                    task_id: &id,
                    subtask: &subtask,
                },
                &human,
            )
        }
        SubtaskCommands::Toggle { task, subtask } => {
            let id = registry.resolve(&task)?;
            registry.toggle_subtask(&id, &subtask)?;
            let Some(updated) = registry.find_subtask(&id, &subtask).cloned() else {
                return Err(crate::error::Error::not_found("subtask", subtask));
            };
            drop(registry);

            let state = if updated.completed { "done" } else { "open" };
            let mut human = HumanOutput::new(format!("Subtask {state}: {}", updated.title));
            human.push_summary("id", updated.id.clone());
            ctx.save(&ws, &mut human);
            ctx.emit(
                "task subtask",
                &SubtaskReport {
                    task_id: &id,
                    subtask: &updated,
                },
                &human,
            )
        }
        SubtaskCommands::Rm { task, subtask } => {
            let id = registry.resolve(&task)?;
            registry.delete_subtask(&id, &subtask)?;
            drop(registry);

            let mut human = HumanOutput::new("Subtask removed");
            human.push_summary("id", subtask.clone());
            ctx.save(&ws, &mut human);
            ctx.emit(
                "task subtask",
                &RemovedReport {
                    id: &subtask,
                    removed: true,
                },
                &human,
            )
        }
    }
}

fn task_line(task: &Task) -> String {
    let short_id: String = task.id.chars().take(8).collect();
    let mut line = format!("{} [{}] {} ({short_id})", task.code, task.status, task.title);
    if let Some(due) = task.dates.due_date {
        line.push_str(&format!(" due {}", due.format("%Y-%m-%d")));
    }
    line
}
