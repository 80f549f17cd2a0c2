use chrono::{Duration, Local, Utc};
use scheduler_module::{
    trigger_name, Instruction, MemoryOsScheduler, SchedulerError, SendMode, TriggerLayout,
    TriggerManager,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn manager(temp: &TempDir) -> TriggerManager<MemoryOsScheduler> {
    let layout = TriggerLayout {
        base_dir: temp.path().to_path_buf(),
        tasks_dir: temp.path().join("scheduled_tasks"),
        executor_path: temp.path().join("run_task.exe"),
    };
    TriggerManager::new(layout, MemoryOsScheduler::new())
}

fn file_send() -> Instruction {
    Instruction::ephemeral(
        "5511999999999",
        SendMode::FileText,
        Some("see attached".to_string()),
        &[PathBuf::from("/data/photo.jpg"), PathBuf::from("/data/report.pdf")],
    )
}

#[test]
fn register_writes_artifacts_and_named_trigger() {
    let temp = TempDir::new().expect("tempdir");
    let manager = manager(&temp);
    let when = Utc::now() + Duration::minutes(2);

    let trigger = manager.register_trigger(7, &file_send(), when).expect("register");
    assert_eq!(trigger.name, "AutoMessage_7");
    assert_eq!(trigger.name, trigger_name(7));
    assert_eq!(trigger.run_at, when.with_timezone(&Local).naive_local());
    assert!(trigger.launcher_path.exists());
    assert!(trigger.wrapper_path.exists());

    let instruction = Instruction::read(&trigger.instruction_path).expect("instruction");
    assert_eq!(instruction.task_id, Some(7));
    assert_eq!(instruction.target, "5511999999999");
    assert_eq!(instruction.mode, SendMode::FileText);
    assert_eq!(
        instruction.attachments(),
        vec![PathBuf::from("/data/photo.jpg"), PathBuf::from("/data/report.pdf")]
    );

    let launcher = fs::read_to_string(&trigger.launcher_path).expect("launcher");
    assert!(launcher.contains(&format!("cd /d \"{}\"", temp.path().display())));
    assert!(launcher.contains(&trigger.instruction_path.display().to_string()));
    assert!(launcher.contains("exit /b %ERRORLEVEL%"));

    let registration = manager
        .os()
        .registration("AutoMessage_7")
        .expect("registered");
    assert_eq!(registration.run_at, trigger.run_at);
    assert!(registration.command.starts_with("wscript.exe"));
    assert!(registration
        .command
        .contains(&trigger.wrapper_path.display().to_string()));
}

#[test]
fn registration_failure_keeps_os_text_and_cleans_up() {
    let temp = TempDir::new().expect("tempdir");
    let manager = manager(&temp);
    manager
        .os()
        .fail_next_with("ERROR: Access is denied.");

    let result = manager.register_trigger(3, &file_send(), Utc::now() + Duration::minutes(5));
    match result {
        Err(SchedulerError::TriggerRegistration(detail)) => {
            assert_eq!(detail, "ERROR: Access is denied.")
        }
        other => panic!("expected registration failure, got {:?}", other),
    }
    assert!(!manager.instruction_path(3).exists());
    assert!(!manager.launcher_path(3).exists());
    assert!(!manager.wrapper_path(3).exists());
    assert!(!manager.is_registered(3).expect("exists"));
}

#[test]
fn unregister_is_best_effort() {
    let temp = TempDir::new().expect("tempdir");
    let manager = manager(&temp);

    assert!(!manager.unregister_trigger(11).expect("absent trigger"));

    manager
        .register_trigger(11, &file_send(), Utc::now() + Duration::minutes(5))
        .expect("register");
    assert!(manager.unregister_trigger(11).expect("remove"));
    assert!(manager.os().registration("AutoMessage_11").is_none());
    assert!(!manager.instruction_path(11).exists());
    assert!(!manager.unregister_trigger(11).expect("second remove"));
}

#[test]
fn registering_again_replaces_the_trigger() {
    let temp = TempDir::new().expect("tempdir");
    let manager = manager(&temp);
    let first = Utc::now() + Duration::minutes(5);
    let second = Utc::now() + Duration::hours(3);

    manager.register_trigger(4, &file_send(), first).expect("first");
    let trigger = manager.register_trigger(4, &file_send(), second).expect("second");
    assert_eq!(manager.os().names(), vec!["AutoMessage_4".to_string()]);
    assert_eq!(
        manager
            .os()
            .registration("AutoMessage_4")
            .expect("registered")
            .run_at,
        trigger.run_at
    );
}
