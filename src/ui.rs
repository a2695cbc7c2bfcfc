use colored::{ColoredString, Colorize};
use lifecycle::{Event, EventSink, State, Status};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

/// `ACTION_STATUS`, colored by status
pub fn state_label(state: State) -> ColoredString {
    let label = format!("{}_{}", state.action, state.status);
    match state.status {
        Status::Complete => label.green(),
        Status::Failed => label.red(),
        Status::InProgress => label.yellow(),
    }
}

/// Truncate a path string for display, keeping the end
pub fn truncate_path(path: &str, max_len: usize) -> String {
    if path.len() <= max_len {
        path.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let start = path.len() - max_len + 3;
        let start = (start..path.len())
            .find(|&i| path.is_char_boundary(i))
            .unwrap_or(path.len());
        format!("...{}", &path[start..])
    }
}

// ============================================================================
// Event Output
// ============================================================================

/// Prints lifecycle events as they happen
pub struct ConsoleEvents {
    quiet: bool,
}

impl ConsoleEvents {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl EventSink for ConsoleEvents {
    fn record(&self, event: &Event) {
        log::debug!(
            "event {} {}_{} {:?}",
            event.resource,
            event.action,
            event.status,
            event.reason
        );
        if self.quiet && event.status != Status::Failed {
            return;
        }

        let state = state_label(State::new(event.action, event.status));
        let line = if event.reason.is_empty() {
            format!("{} {state}", event.resource)
        } else {
            format!("{} {state} {}", event.resource, event.reason.dimmed())
        };
        if event.status == Status::Failed {
            eprintln!("  {line}");
        } else {
            println!("  {line}");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
