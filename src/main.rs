//! Yapper - chat with hosted and local LLMs from the terminal.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use yapper::app::{mask_api_key, App};
use yapper::config::Config;
use yapper::logging;
use yapper::session::SendOutcome;

#[derive(Debug, Parser)]
#[command(name = "yapper", version, about = "Chat with hosted and local LLMs")]
struct Cli {
    /// Config file (defaults to ~/.config/yapper/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in through the browser
    Login,
    /// Finish signing in with the URL the browser was redirected to
    Callback { url: String },
    /// Refresh the access token
    Refresh,
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Show or change the identity provider settings
    AuthConfig(AuthConfigArgs),
    /// List providers and models
    Providers,
    /// Select a provider and model
    Use { provider: String, model: String },
    /// Set a provider's API key (empty to clear)
    SetKey { provider: String, key: String },
    /// Set a provider's base URL
    SetBaseUrl { provider: String, url: String },
    /// Turn streaming on or off
    Streaming {
        #[arg(value_parser = ["on", "off"])]
        mode: String,
    },
    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    /// Send a message, or chat interactively when MESSAGE is omitted
    Chat { message: Option<String> },
}

#[derive(Debug, Args)]
struct AuthConfigArgs {
    #[arg(long)]
    issuer_url: Option<String>,
    #[arg(long)]
    client_id: Option<String>,
    #[arg(long)]
    redirect_uri: Option<String>,
    #[arg(long)]
    scope: Option<String>,
}

#[derive(Debug, Subcommand)]
enum SessionsCommand {
    List,
    New,
    Delete { id: String },
    Switch { id: String },
    /// Print the active session
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load(),
    };
    logging::init(&config.logging.filter);

    let mut app = App::new(config)?;
    run(&mut app, cli.command).await
}

async fn run(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Login => {
            let url = app.auth.login()?;
            redirect(&url);
        }
        Command::Callback { url } => {
            let state = app.auth.handle_callback(&url).await?;
            if let Some(user) = &state.user {
                println!("Signed in as {} <{}>", user.username, user.email);
            }
        }
        Command::Refresh => {
            if app.auth.refresh().await? {
                println!("Token refreshed");
            } else if app.auth.is_authenticated() {
                println!("No refresh token held; the current token was kept");
            } else {
                println!("Not signed in");
            }
        }
        Command::Logout => {
            let url = app.auth.logout().await;
            redirect(&url);
        }
        Command::Whoami => match &app.auth.state().user {
            Some(user) if app.auth.is_authenticated() => {
                println!("{} <{}>", user.name, user.email);
                println!("username: {}", user.username);
                println!("id:       {}", user.id);
            }
            _ => println!("Not signed in"),
        },
        Command::AuthConfig(args) => auth_config(app, args)?,
        Command::Providers => providers(app),
        Command::Use { provider, model } => {
            if !app.update_settings(|s| s.select(&provider, &model))? {
                bail!("Unknown provider: {}", provider);
            }
            app.sessions.retarget_active(&provider, &model)?;
            println!("Using {} / {}", provider, model);
        }
        Command::SetKey { provider, key } => {
            if !app.update_settings(|s| s.set_api_key(&provider, &key))? {
                bail!("Unknown provider: {}", provider);
            }
            println!("API key for {} updated", provider);
        }
        Command::SetBaseUrl { provider, url } => {
            if !app.update_settings(|s| s.set_base_url(&provider, &url))? {
                bail!("Unknown provider: {}", provider);
            }
            println!("Base URL for {} set to {}", provider, url);
        }
        Command::Streaming { mode } => {
            let enabled = mode == "on";
            app.update_settings(|s| {
                s.streaming_enabled = enabled;
                true
            })?;
            println!("Streaming {}", mode);
        }
        Command::Sessions { command } => sessions(app, command)?,
        Command::Chat { message } => {
            if !app.auth.is_authenticated() {
                bail!("Not signed in. Run `yapper login` first.");
            }
            match message {
                Some(message) => chat_once(app, &message).await?,
                None => repl(app).await?,
            }
        }
    }
    Ok(())
}

/// Print a URL and try to open it in the browser.
fn redirect(url: &str) {
    println!("{}", url);
    if let Err(e) = open::that(url) {
        tracing::warn!(error = %e, "Could not open browser");
    }
}

fn auth_config(app: &mut App, args: AuthConfigArgs) -> Result<()> {
    let AuthConfigArgs {
        issuer_url,
        client_id,
        redirect_uri,
        scope,
    } = args;
    if issuer_url.is_some() || client_id.is_some() || redirect_uri.is_some() || scope.is_some() {
        let mut config = app.auth.config().clone();
        if let Some(v) = issuer_url {
            config.issuer_url = v;
        }
        if let Some(v) = client_id {
            config.client_id = v;
        }
        if let Some(v) = redirect_uri {
            config.redirect_uri = v;
        }
        if let Some(v) = scope {
            config.scope = v;
        }
        app.auth.update_config(config)?;
    }

    let config = app.auth.config();
    println!("issuer_url:   {}", config.issuer_url);
    println!("client_id:    {}", config.client_id);
    println!("redirect_uri: {}", config.redirect_uri);
    println!("scope:        {}", config.scope);
    Ok(())
}

fn providers(app: &App) {
    let settings = app.settings();
    for provider in &settings.providers {
        let key = match provider.api_key.as_deref() {
            Some(key) => mask_api_key(key),
            None if provider.requires_api_key => "(no key)".to_string(),
            None => "(no key needed)".to_string(),
        };
        println!("{} [{}] {}", provider.name, provider.id, key);
        if let Some(url) = &provider.base_url {
            println!("  base url: {}", url);
        }
        for model in &provider.models {
            let marker = if provider.id == settings.selected_provider
                && model.id == settings.selected_model
            {
                "*"
            } else {
                " "
            };
            println!("  {} {} ({})", marker, model.id, model.name);
        }
    }
    println!(
        "streaming: {}",
        if settings.streaming_enabled { "on" } else { "off" }
    );
}

fn sessions(app: &mut App, command: SessionsCommand) -> Result<()> {
    match command {
        SessionsCommand::List => {
            let active = app.sessions.active_session().map(|s| s.id.clone());
            for session in app.sessions.sessions() {
                let marker = if Some(&session.id) == active.as_ref() { "*" } else { " " };
                println!(
                    "{} {}  {}  ({} messages, {}/{})",
                    marker,
                    session.id,
                    session.title,
                    session.messages.len(),
                    session.provider,
                    session.model
                );
            }
        }
        SessionsCommand::New => {
            let id = app.new_session()?;
            println!("{}", id);
        }
        SessionsCommand::Delete { id } => {
            if !app.sessions.delete_session(&id)? {
                bail!("No such session: {}", id);
            }
        }
        SessionsCommand::Switch { id } => {
            if !app.sessions.switch_session(&id)? {
                bail!("No such session: {}", id);
            }
        }
        SessionsCommand::Show => match app.sessions.active_session() {
            Some(session) => {
                println!("# {}", session.title);
                for message in &session.messages {
                    println!("{}{}", message.role.prefix(), message.content);
                }
            }
            None => println!("No active session"),
        },
    }
    Ok(())
}

async fn print_deltas(mut rx: mpsc::Receiver<String>) {
    let mut stdout = std::io::stdout();
    while let Some(delta) = rx.recv().await {
        print!("{}", delta);
        let _ = stdout.flush();
    }
}

/// Send one message, creating a session first if there is none.
async fn chat_once(app: &mut App, message: &str) -> Result<()> {
    let streaming = app.settings().streaming_enabled;
    loop {
        let (tx, rx) = mpsc::channel(64);
        let printer = tokio::spawn(print_deltas(rx));
        let outcome = app.send(message, Some(tx)).await;
        let _ = printer.await;

        match outcome? {
            SendOutcome::SessionCreated { .. } => continue,
            SendOutcome::Completed { response, .. } => {
                if streaming {
                    println!();
                } else {
                    println!("{}", response);
                }
                return Ok(());
            }
        }
    }
}

async fn repl(app: &mut App) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", yapper::message::Role::User.prefix());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }
        if let Err(e) = chat_once(app, line).await {
            eprintln!("Error: {:#}", e);
        }
    }
    Ok(())
}
