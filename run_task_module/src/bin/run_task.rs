//! Executor process started by a one-shot trigger or by an immediate send:
//! `run_task <instruction.json>`.

use run_task_module::{init_execution_logging, report_setup_failure, BrokerContext, RunTaskError};
use scheduler_module::AppConfig;
use send_message_module::{ActionExecutor, SendSettings, SessionOptions, WebDriverLauncher};
use std::env;
use std::path::PathBuf;
use std::process::exit;
use tracing::warn;

fn main() {
    let Some(raw_path) = env::args_os().nth(1) else {
        let err = RunTaskError::MissingArgument;
        eprintln!("{}\nusage: run_task <instruction.json>", err);
        exit(err.exit_code());
    };
    let instruction_path = absolute(PathBuf::from(raw_path));

    // Without a config there is no store to update; the sidecar is the
    // only place the failure can go.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            let err = RunTaskError::Setup(format!("configuration error: {}", err));
            exit(report_setup_failure(None, &instruction_path, err));
        }
    };
    init_execution_logging(&config.log_dir, &instruction_path);

    let store = match config.open_store() {
        Ok(store) => Some(store),
        Err(err) => {
            warn!("task store {} unavailable: {}", config.db_path.display(), err);
            None
        }
    };

    let settings = SendSettings::from_env();
    let catalog = match settings.load_catalog() {
        Ok(catalog) => catalog,
        Err(err) => {
            let err = RunTaskError::Setup(format!("selector catalog unusable: {}", err));
            exit(report_setup_failure(store.as_ref(), &instruction_path, err));
        }
    };
    let launcher = match WebDriverLauncher::new(&settings.webdriver_url) {
        Ok(launcher) => launcher,
        Err(err) => {
            let err = RunTaskError::Setup(format!("webdriver client setup failed: {}", err));
            exit(report_setup_failure(store.as_ref(), &instruction_path, err));
        }
    };

    let broker = BrokerContext {
        store,
        launcher,
        executor: ActionExecutor::new(catalog, settings.timeouts)
            .with_screenshot_dir(config.log_dir.join("screenshots")),
        profiles_dir: config.profiles_dir.clone(),
        remote_url: settings.remote_url.clone(),
        session_options: SessionOptions {
            browser_binary: settings.browser_binary.clone(),
            ..SessionOptions::default()
        },
    };
    exit(broker.entry(&instruction_path));
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}
