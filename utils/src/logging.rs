use chrono::Local;
use log::LevelFilter;

pub fn setup_logging() -> Result<(), fern::InitError> {
    let level = level_from_env(std::env::var("LOG_LEVEL").ok().as_deref());

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}] {}: {}",
                Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        // hyper and reqwest are chatty at debug
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()?;

    Ok(())
}

fn level_from_env(value: Option<&str>) -> LevelFilter {
    match value {
        Some("debug") => LevelFilter::Debug,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info, // Default to Info if variable is unset or has an unrecognized value
    }
}
