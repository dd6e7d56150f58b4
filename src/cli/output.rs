//! Output formatting for the Herd CLI
//!
//! Streamed host output goes to stdout, everything else (settings, progress,
//! the per-host recap and the summary) to stderr, so that `herd run ... > out`
//! captures only what the hosts printed.

use chrono::Local;
use colored::Colorize;
use indexmap::IndexMap;
use std::io::{self, Write};

use crate::executor::{HistoryItem, HostResult, OutputLine, ProgressMessage, ProgressState};

/// Output formatter for the human and JSON modes
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    use_color: bool,
    json_mode: bool,
    timestamp: bool,
    verbosity: u8,
}

impl OutputFormatter {
    pub fn new(use_color: bool, json_mode: bool, timestamp: bool, verbosity: u8) -> Self {
        let use_color = use_color && std::env::var_os("NO_COLOR").is_none();
        colored::control::set_override(use_color);

        Self {
            use_color,
            json_mode,
            timestamp,
            verbosity,
        }
    }

    pub fn is_json(&self) -> bool {
        self.json_mode
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Render one streamed line, prefixed with the padded host name
    pub fn format_output_line(&self, line: &OutputLine, width: usize) -> String {
        let text = String::from_utf8_lossy(&line.data);
        let text = text.trim_end_matches(['\n', '\r']);
        let name = format!("{:<width$}", line.host.name);
        let name = match (self.use_color, line.is_stderr()) {
            (false, _) => name,
            (true, false) => name.cyan().to_string(),
            (true, true) => name.red().to_string(),
        };

        if self.timestamp {
            format!("{} {name} | {text}", Local::now().format("%H:%M:%S"))
        } else {
            format!("{name} | {text}")
        }
    }

    /// Print one streamed line
    pub fn output_line(&self, line: &OutputLine, width: usize) {
        if self.json_mode {
            return;
        }
        let rendered = self.format_output_line(line, width);
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{rendered}");
    }

    /// Print a component's settings
    pub fn settings(&self, name: &str, settings: &IndexMap<&'static str, String>) {
        if self.json_mode {
            return;
        }
        eprintln!("{}", self.bold(&format!("{name}:")));
        for (key, value) in settings {
            eprintln!("  {key}: {value}");
        }
    }

    /// Report a finished host while the run is in flight
    pub fn progress(&self, message: &ProgressMessage, finished: usize, total: usize) {
        if self.json_mode || self.verbosity == 0 || message.state != ProgressState::Finished {
            return;
        }
        eprintln!("[{finished}/{total}] {} finished", message.host.name);
    }

    /// Render the recap line for one host
    pub fn format_host_result(&self, result: &HostResult, width: usize) -> String {
        let name = format!("{:<width$}", result.host);
        let status = match &result.error {
            Some(error) => format!("error: {error}"),
            None => format!("exit {}", result.exit_status),
        };
        let status = if !self.use_color {
            status
        } else if result.is_ok() {
            status.green().to_string()
        } else if result.is_failure() {
            status.yellow().to_string()
        } else {
            status.red().bold().to_string()
        };
        format!("{name}   {status}")
    }

    /// Render the summary line of a run
    pub fn format_summary(&self, item: &HistoryItem) -> String {
        let summary = &item.summary;
        let elapsed = humantime::format_duration(round_to_millis(item.elapsed()));
        let counts = if self.use_color {
            format!(
                "{} {} {}",
                format!("ok={}", summary.ok).green(),
                colorize_if(format!("fail={}", summary.fail), summary.fail > 0, |s| s.yellow()),
                colorize_if(format!("err={}", summary.err), summary.err > 0, |s| s.red().bold()),
            )
        } else {
            format!("ok={} fail={} err={}", summary.ok, summary.fail, summary.err)
        };
        format!("{} hosts in {elapsed}: {counts}", summary.total())
    }

    /// Print the recap of a run: non-ok hosts, then the summary
    pub fn recap(&self, item: &HistoryItem) {
        if self.json_mode {
            return;
        }
        let width = item.max_host_name_length();
        let show_all = self.verbosity > 0;
        for result in &item.results {
            if show_all || !result.is_ok() {
                eprintln!("{}", self.format_host_result(result, width));
            }
        }
        eprintln!("{}", self.format_summary(item));
    }

    /// Print the run record as JSON on stdout
    pub fn json(&self, item: &HistoryItem) -> crate::error::Result<()> {
        let rendered = item.to_json()?;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{rendered}")?;
        Ok(())
    }

    /// Print a plain informational line
    pub fn info(&self, message: &str) {
        if !self.json_mode {
            eprintln!("{message}");
        }
    }

    pub fn warning(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "[WARNING]".yellow().bold(), message.yellow());
        } else {
            eprintln!("[WARNING] {message}");
        }
    }

    pub fn error(&self, message: &str) {
        if self.use_color {
            eprintln!("{} {}", "[ERROR]".red().bold(), message.red());
        } else {
            eprintln!("[ERROR] {message}");
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.use_color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }
}

fn colorize_if(
    text: String,
    condition: bool,
    paint: impl Fn(&str) -> colored::ColoredString,
) -> String {
    if condition {
        paint(&text).to_string()
    } else {
        text
    }
}

fn round_to_millis(elapsed: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
