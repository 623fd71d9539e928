use colored::*;
use terminal_size::{Width, Height, terminal_size};

use crate::agent::ScheduleArtifact;
use crate::auth::{AuthPrompt, AuthStatus};

fn terminal_width() -> usize {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    width.0 as usize
}

pub fn print_header(model: &str, provider: &str) {
    let line = "─".repeat(terminal_width());
    println!("{}", line.black().bold());

    let name = "M365 Assistant".blue().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  📅 {} {}", name, version);

    let info = format!("  {}  •  {}", model, provider).cyan();
    println!("{}", info);

    println!("{}", line.black().bold());
}

/// Sign-in instructions, with the code highlighted.
pub fn print_auth_prompt(prompt: &AuthPrompt) {
    let title = match prompt.status {
        AuthStatus::AuthenticationRequired => "Sign-in required",
        AuthStatus::AuthenticationPending => "Sign-in still pending",
    };

    println!();
    println!("  {} {}", "🔐".yellow(), title.yellow().bold());
    println!("  {}", prompt.message);
    println!("  Open   {}", prompt.verification_uri.cyan().underline());
    println!("  Code   {}", prompt.user_code.bold());
    println!();
}

pub fn print_schedule(schedule: &ScheduleArtifact) {
    let line = "─".repeat(terminal_width().min(60));
    println!();
    println!("  {}", "Your day".green().bold());
    println!("{}", line.black().bold());
    println!("{}", schedule);
    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}
