//! CLI command definitions and terminal helpers.

pub mod args;

use colored::Colorize;

/// A bold section header on stdout.
pub fn print_header(title: &str) {
    println!("{} {}", "==>".cyan().bold(), title.bold());
}

/// A check result line: green tick or red cross.
pub fn status_line(ok: bool, message: &str) -> String {
    if ok {
        format!("  {} {message}", "✔".green().bold())
    } else {
        format!("  {} {}", "✖".red().bold(), message.red())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_contains_message() {
        colored::control::set_override(false);
        assert_eq!(status_line(true, "valid"), "  ✔ valid");
        assert_eq!(status_line(false, "broken"), "  ✖ broken");
    }
}
