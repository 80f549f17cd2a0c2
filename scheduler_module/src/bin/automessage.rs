//! Command-line controller: schedule, inspect and manage send tasks.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use scheduler_module::{
    AppConfig, Controller, MemoryOsScheduler, OsScheduler, SchedulerError, SendMode,
    SendOutcome, SendRequest, Task, TaskDraft, TaskStore, TriggerManager,
};
use std::env;
use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::AtomicBool;

const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn print_usage() {
    eprintln!(
        r##"Usage: automessage <command> [arguments]

Commands:
  schedule --to <target> --mode <text|file|file_text> --at "YYYY-MM-DD HH:MM"
           [--message "text"] [--file <path>]... [--dry-run]
  send-now --to <target> --mode <text|file|file_text> [--message "text"] [--file <path>]...
  list                               All tasks, latest schedule first
  pending                            Pending tasks, earliest first (overdue ones flagged)
  show <id>                          One task in full
  edit <id> --to <target> --mode <mode> --at "YYYY-MM-DD HH:MM" [--message "text"] [--file <path>]...
  delete <id>                        Remove a task and its trigger (refused while running)
  cancel <id>                        Mark a pending task cancelled and remove its trigger
  watch                              Print status counts every poll interval

Times are local. --dry-run validates and registers against a throwaway database,
task directory and in-memory trigger set; nothing it writes is kept.

Environment Variables:
  AUTOMESSAGE_BASE_DIR            Application directory (default: executable directory)
  AUTOMESSAGE_DB_PATH             Task database (default: <base>/user_data/scheduler.db)
  AUTOMESSAGE_TASKS_DIR           Instruction and launcher files (default: <base>/scheduled_tasks)
  AUTOMESSAGE_EXECUTOR_PATH       Executor binary (default: <base>/run_task)
  AUTOMESSAGE_POLL_INTERVAL_SECS  Refresh interval for watch (default: 5)
"##
    );
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.to_string());
        }
        if arg == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn parse_all(args: &[String], flag: &str) -> Vec<String> {
    let prefix = format!("{}=", flag);
    let mut values = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            values.push(value.to_string());
        } else if arg == flag {
            if let Some(value) = iter.next() {
                values.push(value.clone());
            }
        }
    }
    values
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_usage();
    exit(EXIT_USAGE);
}

fn parse_local_time(raw: &str) -> Result<DateTime<Utc>, String> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M")
        .map_err(|err| format!("invalid --at '{}': {}", raw, err))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|value| value.with_timezone(&Utc))
        .ok_or_else(|| format!("--at '{}' is ambiguous or skipped in local time", raw))
}

fn parse_id(args: &[String]) -> i64 {
    match args.get(2).map(|raw| raw.parse::<i64>()) {
        Some(Ok(id)) => id,
        Some(Err(_)) => usage_error("task id must be an integer"),
        None => usage_error("task id required"),
    }
}

fn parse_send(args: &[String]) -> SendRequest {
    let target = parse_arg(args, "--to").unwrap_or_default();
    if target.trim().is_empty() {
        usage_error("--to is required");
    }
    let mode = match parse_arg(args, "--mode").unwrap_or_else(|| "text".to_string()).parse::<SendMode>() {
        Ok(mode) => mode,
        Err(err) => usage_error(&err.to_string()),
    };
    SendRequest {
        target,
        mode,
        message: parse_arg(args, "--message"),
        attachments: parse_all(args, "--file").into_iter().map(PathBuf::from).collect(),
    }
}

fn parse_draft(args: &[String]) -> TaskDraft {
    let send = parse_send(args);
    let at = match parse_arg(args, "--at") {
        Some(raw) => parse_local_time(&raw).unwrap_or_else(|err| usage_error(&err)),
        None => usage_error("--at is required"),
    };
    TaskDraft {
        target: send.target,
        mode: send.mode,
        message: send.message,
        attachments: send.attachments,
        scheduled_time: at,
    }
}

fn describe(task: &Task) -> String {
    format!(
        "#{:<5} {:<10} {:<16} {:<9} {}  {}",
        task.id,
        task.status,
        task.scheduled_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        task.mode,
        task.target,
        task.message.as_deref().unwrap_or("")
    )
}

fn print_details(task: &Task) {
    println!("id:             {}", task.id);
    println!("name:           {}", task.name);
    println!("status:         {}", task.status);
    println!("target:         {}", task.target);
    println!("mode:           {}", task.mode);
    println!("message:        {}", task.message.as_deref().unwrap_or("-"));
    for path in &task.attachments {
        println!("attachment:     {}", path.display());
    }
    println!(
        "scheduled_time: {}",
        task.scheduled_time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "created_at:     {}",
        task.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(executed_at) = task.executed_at {
        println!(
            "executed_at:    {}",
            executed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!("attempts:       {}", task.attempts);
    if let Some(error) = &task.error_message {
        println!("error:          {}", error);
    }
}

fn run<S: OsScheduler + 'static>(
    config: &AppConfig,
    controller: &Controller<S>,
    args: &[String],
) -> Result<(), SchedulerError> {
    match args[1].as_str() {
        "schedule" => {
            let draft = parse_draft(args);
            let job = controller.schedule_task(&draft)?;
            let trigger = job.wait()??;
            println!(
                "scheduled {} for {}",
                trigger.name,
                trigger.run_at.format("%Y-%m-%d %H:%M")
            );
        }
        "send-now" => {
            let request = parse_send(args);
            match controller.send_now(&request)?.wait()? {
                SendOutcome::Sent => println!("sent to {}", request.target),
                SendOutcome::Failed { reason, .. } => {
                    return Err(SchedulerError::Executor(reason));
                }
            }
        }
        "list" => {
            for task in controller.store().list_all()? {
                println!("{}", describe(&task));
            }
        }
        "pending" => {
            let now = Utc::now();
            for task in controller.store().list_pending()? {
                let flag = if task.scheduled_time < now { " (overdue)" } else { "" };
                println!("{}{}", describe(&task), flag);
            }
        }
        "show" => {
            let id = parse_id(args);
            match controller.store().get_by_id(id)? {
                Some(task) => print_details(&task),
                None => return Err(SchedulerError::NotFound(id.into())),
            }
        }
        "edit" => {
            let id = parse_id(args);
            let draft = parse_draft(args);
            let trigger = controller.edit_task(id, &draft)?.wait()??;
            println!(
                "rescheduled {} for {}",
                trigger.name,
                trigger.run_at.format("%Y-%m-%d %H:%M")
            );
        }
        "delete" => {
            let id = parse_id(args);
            if controller.delete_task(id)? {
                println!("deleted task {}", id);
            } else {
                println!("task {} did not exist", id);
            }
        }
        "cancel" => {
            let id = parse_id(args);
            let task = controller.cancel_task(id)?;
            println!("{}", describe(&task));
        }
        "watch" => {
            let stop = AtomicBool::new(false);
            controller.run_refresh_loop(config.poll_interval, &stop, |snapshot| match snapshot {
                Ok(snapshot) => {
                    let counts = snapshot.counts;
                    println!(
                        "{} pending={} running={} completed={} failed={} cancelled={}",
                        snapshot.taken_at.with_timezone(&Local).format("%H:%M:%S"),
                        counts.pending,
                        counts.running,
                        counts.completed,
                        counts.failed,
                        counts.cancelled
                    );
                    for task in snapshot.overdue() {
                        println!("  overdue: {}", describe(task));
                    }
                }
                Err(err) => eprintln!("refresh failed: {}", err),
            });
        }
        other => usage_error(&format!("unknown command '{}'", other)),
    }
    Ok(())
}

fn open_store(config: &AppConfig) -> Result<TaskStore, SchedulerError> {
    config.open_store().map_err(|err| {
        SchedulerError::Storage(format!("cannot open {}: {}", config.db_path.display(), err))
    })
}

/// Runs the command against a scratch database and task directory that are
/// removed on return, with triggers kept in memory.
fn dry_run(config: &AppConfig, args: &[String]) -> Result<(), SchedulerError> {
    let scratch = tempfile::Builder::new()
        .prefix("automessage-dry-run")
        .tempdir()?;
    let config = config.with_scratch_dir(scratch.path());
    let store = open_store(&config)?;
    let triggers = TriggerManager::new(config.trigger_layout(), MemoryOsScheduler::new());
    let (controller, _events) = Controller::new(store, triggers);
    run(&config, &controller, args)?;
    println!("dry run: nothing was kept");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        exit(EXIT_USAGE);
    }
    if matches!(args[1].as_str(), "-h" | "--help" | "help") {
        print_usage();
        return;
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            exit(EXIT_FAILURE);
        }
    };

    let result = if has_flag(&args, "--dry-run") {
        dry_run(&config, &args)
    } else {
        open_store(&config).and_then(|store| {
            let triggers = TriggerManager::new(config.trigger_layout(), config.schtasks());
            let (controller, _events) = Controller::new(store, triggers);
            run(&config, &controller, &args)
        })
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        exit(EXIT_FAILURE);
    }
}
