use std::path::Path;

/// Batch launcher run by the OS scheduler. Switches to the application
/// directory, runs the executor on one instruction file and hands its exit
/// code back. `chcp 65001` keeps non-ASCII paths intact.
pub(crate) fn launcher_script(base_dir: &Path, executor_path: &Path, instruction_path: &Path) -> String {
    [
        "@echo off".to_string(),
        "chcp 65001 >nul".to_string(),
        format!("cd /d \"{}\"", base_dir.display()),
        format!(
            "\"{}\" \"{}\"",
            executor_path.display(),
            instruction_path.display()
        ),
        "exit /b %ERRORLEVEL%".to_string(),
    ]
    .join("\r\n")
        + "\r\n"
}

/// VBScript wrapper that runs the launcher with no visible window, waits
/// for it and returns the same exit code.
pub(crate) fn silent_wrapper_script(launcher_path: &Path) -> String {
    let launcher = launcher_path.display().to_string().replace('"', "\"\"");
    [
        "Set shell = CreateObject(\"WScript.Shell\")".to_string(),
        format!("exitCode = shell.Run(\"\"\"{}\"\"\", 0, True)", launcher),
        "WScript.Quit exitCode".to_string(),
    ]
    .join("\r\n")
        + "\r\n"
}

/// Command line registered with the OS trigger.
pub(crate) fn trigger_command(wrapper_path: &Path) -> String {
    format!("wscript.exe \"{}\"", wrapper_path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn launcher_changes_directory_and_propagates_exit_code() {
        let script = launcher_script(
            &PathBuf::from(r"C:\AutoMessage"),
            &PathBuf::from(r"C:\AutoMessage\run_task.exe"),
            &PathBuf::from(r"C:\AutoMessage\scheduled_tasks\task_7.json"),
        );
        let lines: Vec<&str> = script.split("\r\n").collect();
        assert_eq!(lines[0], "@echo off");
        assert_eq!(lines[2], r#"cd /d "C:\AutoMessage""#);
        assert_eq!(
            lines[3],
            r#""C:\AutoMessage\run_task.exe" "C:\AutoMessage\scheduled_tasks\task_7.json""#
        );
        assert_eq!(lines[4], "exit /b %ERRORLEVEL%");
        assert!(script.ends_with("\r\n"));
    }

    #[test]
    fn wrapper_runs_hidden_and_waits() {
        let script = silent_wrapper_script(&PathBuf::from(r"C:\tasks\task_7.bat"));
        assert!(script.contains(r#"shell.Run("""C:\tasks\task_7.bat""", 0, True)"#));
        assert!(script.contains("WScript.Quit exitCode"));
        assert_eq!(
            trigger_command(&PathBuf::from(r"C:\tasks\task_7.vbs")),
            r#"wscript.exe "C:\tasks\task_7.vbs""#
        );
    }
}
