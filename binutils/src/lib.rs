/// re-export clap
pub extern crate clap;
extern crate tracing_subscriber;
use clap::builder::styling::{AnsiColor, Color, Style};

const fn ansi(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

/// Cargo-like terminal color style.
///
/// # Example
///
/// ```
/// # use clap::Parser;
/// #[derive(Parser)]
/// #[command(name = "cli", styles = binutils::get_styles())]
/// struct Cli {
///     /// name of the test to run
///     test: String,
/// }
/// ```
pub fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(ansi(AnsiColor::BrightGreen).bold())
        .header(ansi(AnsiColor::BrightGreen).bold())
        .literal(ansi(AnsiColor::Cyan).bold())
        .placeholder(ansi(AnsiColor::Cyan))
        .valid(ansi(AnsiColor::Green).bold().underline())
        .invalid(ansi(AnsiColor::Red).bold())
        .error(ansi(AnsiColor::Red).bold())
}

/// Logging configuration: a compact terminal layer, plus an optional
/// JSON layer writing to `log_file`.
pub fn logging_setup(
    max_level: tracing::Level,
    log_file: Option<impl std::io::Write + Clone + Send + 'static>,
) {
    use tracing_subscriber::{filter::LevelFilter, prelude::*};

    let level = LevelFilter::from_level(max_level);

    let terminal_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_target(false)
        .without_time()
        .with_thread_names(false)
        .with_filter(level);

    let file_log = log_file.map(|file| {
        let file = std::sync::Mutex::new(file);
        tracing_subscriber::fmt::layer()
            .json()
            .with_thread_names(true)
            .with_writer(move || file.lock().unwrap().clone())
            .with_filter(level)
    });

    tracing_subscriber::registry()
        .with(file_log)
        .with(terminal_log)
        .init();
}
