//! M365 Assistant CLI entry point

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use anyhow::Result;

use m365_assistant::agent::{Assistant, Plan, ProviderRegistry, Session};
use m365_assistant::auth::{AuthCoordinator, SignInState};
use m365_assistant::config::{self, Config};
use m365_assistant::ui;

#[derive(Parser)]
#[command(name = "m365-assistant")]
#[command(about = "📅 Plan your day from your Microsoft 365 mailbox and calendar")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a schedule from recent mail and upcoming events
    Plan {
        /// Request to send; starts an interactive session when omitted
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Sign in with a device code
    Login {
        /// Print the code without opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Remove the cached account
    Logout,

    /// Show configuration and sign-in state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Setup Global Ctrl+C handler
    let exit_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let r = exit_flag.clone();

    ctrlc::set_handler(move || {
        if r.load(std::sync::atomic::Ordering::SeqCst) {
            println!("\n👋 Bye!");
            std::process::exit(0);
        } else {
            println!("\n⚠️  Press Ctrl+C again to exit");
            r.store(true, std::sync::atomic::Ordering::SeqCst);

            // Reset flag after 3 seconds
            let r2 = r.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_secs(3));
                r2.store(false, std::sync::atomic::Ordering::SeqCst);
            });
        }
    }).ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { message } => {
            let config = config::load()?;
            config.validate()?;

            let auth = Arc::new(AuthCoordinator::from_config(&config)?);
            let assistant = Assistant::from_config(&config, auth)?;
            let mut session = Session::new();

            ui::print_header(&config.llm.executor_model, &config.llm.provider);

            if let Some(msg) = message {
                // Single request mode
                ui::print_thinking("Reading your mailbox and calendar");
                let plan = assistant.run(&mut session, &msg).await?;
                show_plan(&plan);
            } else {
                run_interactive(&assistant, &mut session).await?;
            }
        }

        Commands::Login { no_browser } => {
            let config = config::load()?;
            run_login(&config, !no_browser).await?;
        }

        Commands::Logout => {
            let config = config::load()?;
            let auth = AuthCoordinator::from_config(&config)?;
            auth.logout().await;
            ui::print_success("Logged out successfully");
        }

        Commands::Status => {
            let config = config::load()?;
            println!("📅 M365 Assistant Status\n");
            println!("Config: {:?}", config::config_path());
            println!("Token cache: {:?}", config.token_cache_path);
            println!("Authority: {}", config.authority);
            println!(
                "Provider: {} (available: {})",
                config.llm.provider,
                ProviderRegistry::available().join(", ")
            );
            println!("Executor model: {}", config.llm.executor_model);
            println!("Planner model: {}", config.llm.planner_model);
            println!("Max iterations: {}", config.max_iterations);

            if config.client_id.is_empty() {
                ui::print_warning("MICROSOFT_CLIENT_ID not set");
            } else {
                let auth = AuthCoordinator::from_config(&config)?;
                match auth.status().await {
                    SignInState::SignedIn { username } => {
                        ui::print_success(&format!("Signed in as {}", username))
                    }
                    SignInState::FlowPending { user_code, .. } => {
                        ui::print_warning(&format!("Sign-in pending (code {})", user_code))
                    }
                    SignInState::SignedOut => {
                        ui::print_warning("Signed out. Run: m365-assistant login")
                    }
                }
            }

            if config.llm.api_key.is_empty() {
                ui::print_warning(&format!("{} not set", config.llm.api_key_env()));
            }
        }
    }

    Ok(())
}

fn show_plan(plan: &Plan) {
    match plan {
        Plan::Schedule(schedule) => ui::print_schedule(schedule),
        Plan::AuthPending(prompt) => {
            ui::print_auth_prompt(prompt);
            ui::print_step("Finish signing in, then ask again (or run: m365-assistant login)");
        }
    }
}

async fn run_interactive(assistant: &Assistant, session: &mut Session) -> Result<()> {
    use std::io::{self, Write};

    println!("📅 Interactive mode (Ctrl+C to exit)\n");

    loop {
        print!("\x1b[1;34mYou\x1b[0m: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("👋 Bye!");
            break;
        }

        if input.is_empty() {
            continue;
        }

        match assistant.run(session, input).await {
            Ok(plan) => show_plan(&plan),
            Err(e) => ui::print_error(&e.to_string()),
        }
    }

    Ok(())
}

async fn run_login(config: &Config, open_browser: bool) -> Result<()> {
    let auth = AuthCoordinator::from_config(config)?;

    println!("🔐 Signing in to Microsoft 365...");

    auth.wait_for_login(|prompt| {
        ui::print_auth_prompt(prompt);
        if open_browser {
            if let Err(e) = open::that(&prompt.verification_uri) {
                ui::print_warning(&format!("Could not open browser: {}", e));
            }
        }
        ui::print_thinking("Waiting for approval");
    })
    .await?;

    match auth.status().await {
        SignInState::SignedIn { username } => {
            ui::print_success(&format!("Signed in as {}", username))
        }
        _ => ui::print_success("Signed in"),
    }
    println!("\nYou can now use: m365-assistant plan -m \"Plan my day\"");

    Ok(())
}
