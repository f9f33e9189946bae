//! Terminal output formatting with colors
//!
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.

use colored::Colorize;

/// Print error (red bold "error:" prefix) to stderr
pub fn error(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// Print warning (yellow "Warning:" prefix) to stderr
pub fn warning(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

/// Print completed action (green label)
pub fn action(label: &str, msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

/// Print section header (cyan bold)
pub fn header(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

/// Print an indented `name: value` line, the name dimmed
pub fn field(indent: usize, name: &str, value: &(impl std::fmt::Display + ?Sized)) {
    println!("{:width$}{} {}", "", format!("{}:", name).dimmed(), value, width = indent * 2);
}

/// Print an indented line; absent values show as a dimmed dash
pub fn entry(indent: usize, msg: Option<&str>) {
    match msg {
        Some(text) => println!("{:width$}{}", "", text, width = indent * 2),
        None => println!("{:width$}{}", "", "-".dimmed(), width = indent * 2),
    }
}

/// Print plain output (no color, for data)
pub fn info(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg);
}
