pub mod app;

use app::config::load_config;
use app::error::AppError;
use app::logging::init_logging;
use app::state::AppState;

/// Loads configuration, installs logging and builds the state shared by the console
/// binaries.
pub fn init_console(trace_id: &str) -> Result<AppState, AppError> {
    let config = load_config(trace_id)?;
    init_logging(&config.logging);
    tracing::debug!(
        trace_id = %trace_id,
        su_program = %config.root.su_program,
        data_dir = %config.data_dir().display(),
        "console initialized"
    );
    Ok(AppState::from_config(config))
}
