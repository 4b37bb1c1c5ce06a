//! Gaggle CLI
//!
//! Gmail and Google Calendar for multiple accounts from the terminal.

mod output;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gaggle_core::calendar::CalendarClient;
use gaggle_core::config::{AccountConfig, Config};
use gaggle_core::fanout;
use gaggle_core::gmail::{detect_html_content, GmailClient};
use gaggle_core::models::{AccountInfo, EventInput, OutgoingEmail, ScheduleRequest};
use gaggle_core::oauth::OAuthManager;
use gaggle_core::schedule::{AccountDraftSender, Dispatcher, ScheduleStore};
use gaggle_core::token_store::{FileTokenStore, TokenStore};

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "gaggle")]
#[command(version)]
#[command(about = "Gmail and Google Calendar from the terminal")]
#[command(long_about = "gaggle manages Gmail and Google Calendar for multiple accounts \
(e.g. work and personal) from one terminal:

  - Read, draft, send, and schedule emails
  - List, create, update, and delete calendar events
  - Query a single account or all accounts at once

Get started by adding an account:
  gaggle auth add personal --client-id YOUR_ID --client-secret YOUR_SECRET")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(short = 'j', long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage account authentication
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// View and modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Read, draft, send, and schedule emails
    #[command(visible_aliases = ["m", "email"])]
    Mail {
        #[command(subcommand)]
        command: MailCommands,
    },
    /// List, create, update, and delete calendar events
    #[command(visible_aliases = ["c", "calendar"])]
    Cal {
        #[command(subcommand)]
        command: CalCommands,
    },
}

// ============================================================================
// Auth Commands
// ============================================================================

#[derive(Subcommand)]
enum AuthCommands {
    /// Add and authenticate a new account
    #[command(long_about = "Add a new Google account and authenticate via OAuth.

You need OAuth client credentials from the Google Cloud Console
(https://console.cloud.google.com):

  1. Create a project and enable the Gmail API and Google Calendar API
  2. Create OAuth 2.0 credentials (Desktop app type)
  3. Add http://localhost:8085/callback as an authorized redirect URI")]
    Add {
        /// Account name (e.g. "work", "personal")
        name: String,
        /// Google OAuth client ID
        #[arg(long)]
        client_id: Option<String>,
        /// Google OAuth client secret
        #[arg(long)]
        client_secret: Option<String>,
        /// Calendar ID to use (default: primary)
        #[arg(long)]
        calendar_id: Option<String>,
    },
    /// List all configured accounts
    List,
    /// Remove an account
    Remove {
        /// Account name
        name: String,
    },
    /// Set the default account
    Default {
        /// Account name
        name: String,
    },
    /// Re-authenticate an existing account
    Reauth {
        /// Account name
        name: String,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    #[command(long_about = "Set a configuration value.

Available keys:
  default-account <name>        Set the default account
  <account>.calendar-id <id>    Set the calendar ID for an account

Examples:
  gaggle config set default-account work
  gaggle config set work.calendar-id \"team@company.com\"")]
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },
    /// Show the configuration file path
    Path,
}

// ============================================================================
// Mail Commands
// ============================================================================

#[derive(Args, Clone)]
struct ComposeArgs {
    /// Recipient email addresses
    #[arg(short = 't', long, value_delimiter = ',')]
    to: Vec<String>,

    /// CC email addresses
    #[arg(long, value_delimiter = ',')]
    cc: Vec<String>,

    /// BCC email addresses
    #[arg(long, value_delimiter = ',')]
    bcc: Vec<String>,

    /// Email subject
    #[arg(short = 's', long)]
    subject: Option<String>,

    /// Email body
    #[arg(short = 'b', long)]
    body: Option<String>,

    /// Body is HTML (also detected from markup in the body)
    #[arg(long)]
    html: bool,
}

impl ComposeArgs {
    fn into_outgoing(self) -> Result<OutgoingEmail> {
        if self.to.is_empty() {
            bail!("at least one recipient is required (--to)");
        }
        let subject = self
            .subject
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("subject is required (--subject)"))?;
        let body = self
            .body
            .filter(|b| !b.is_empty())
            .ok_or_else(|| anyhow!("body is required (--body)"))?;
        let is_html = self.html || detect_html_content(&body);

        Ok(OutgoingEmail {
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject,
            body,
            is_html,
        })
    }
}

#[derive(Subcommand)]
enum MailCommands {
    /// List emails from one or all accounts
    #[command(long_about = "List emails from one or all accounts.

Examples:
  gaggle mail read                      # Read from default account
  gaggle mail read -a work              # Read from work account
  gaggle mail read --all                # Read from all accounts
  gaggle mail read -q \"is:unread\"       # Filter unread emails
  gaggle mail read -n 20                # Limit to 20 emails")]
    Read {
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
        /// Read from all accounts
        #[arg(long)]
        all: bool,
        /// Gmail search query
        #[arg(short = 'q', long)]
        query: Option<String>,
        /// Maximum number of emails to fetch per account
        #[arg(short = 'n', long, default_value_t = 25)]
        limit: u32,
    },
    /// Get email details
    Get {
        /// Message ID
        id: String,
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
    },
    /// Create an email draft
    Draft {
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
        #[command(flatten)]
        compose: ComposeArgs,
    },
    /// Send an existing draft
    Send {
        /// Draft ID
        draft_id: String,
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
    },
    /// Compose and send an email immediately
    SendNow {
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
        #[command(flatten)]
        compose: ComposeArgs,
    },
    /// Schedule an email to be sent later
    #[command(long_about = "Create an email draft and schedule it for later sending.

The scheduled time should be in ISO 8601 format (e.g. 2024-12-25T10:00:00).

Example:
  gaggle mail schedule -t user@example.com -s Hello -b \"Message\" --at 2024-12-25T10:00:00")]
    Schedule {
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
        #[command(flatten)]
        compose: ComposeArgs,
        /// Schedule time (ISO 8601 format)
        #[arg(long)]
        at: String,
    },
    /// Manage scheduled emails
    Scheduled {
        #[command(subcommand)]
        command: ScheduledCommands,
    },
}

#[derive(Subcommand)]
enum ScheduledCommands {
    /// List scheduled emails
    List {
        /// Account to use (default: all accounts)
        #[arg(short = 'a', long)]
        account: Option<String>,
        /// Show only pending emails
        #[arg(long)]
        pending: bool,
    },
    /// Send scheduled emails that are ready
    Send {
        /// Account to use (default: all accounts)
        #[arg(short = 'a', long)]
        account: Option<String>,
        /// Show what would be sent without sending
        #[arg(long)]
        dry_run: bool,
    },
    /// Clear scheduled emails
    Clear {
        /// Account to use (default: all accounts)
        #[arg(short = 'a', long)]
        account: Option<String>,
        /// Clear sent emails only
        #[arg(long)]
        sent: bool,
        /// Clear all scheduled emails
        #[arg(long)]
        all: bool,
    },
}

// ============================================================================
// Calendar Commands
// ============================================================================

#[derive(Args, Clone)]
struct EventArgs {
    /// Event title/summary
    #[arg(short = 's', long)]
    summary: Option<String>,

    /// Event description
    #[arg(short = 'd', long)]
    description: Option<String>,

    /// Event location
    #[arg(short = 'l', long)]
    location: Option<String>,

    /// Start time (ISO 8601; date only with --all-day)
    #[arg(long)]
    start: Option<String>,

    /// End time (ISO 8601; date only with --all-day)
    #[arg(long)]
    end: Option<String>,

    /// All-day event
    #[arg(long)]
    all_day: bool,

    /// Attendee email addresses
    #[arg(long, value_delimiter = ',')]
    attendees: Vec<String>,
}

impl EventArgs {
    fn into_input(self) -> Result<EventInput> {
        let parse = |value: &str| -> Result<DateTime<Utc>> {
            if self.all_day {
                parse_date(value)
            } else {
                parse_datetime(value)
            }
        };
        let start = self
            .start
            .as_deref()
            .map(parse)
            .transpose()
            .context("invalid start time")?;
        let end = self
            .end
            .as_deref()
            .map(parse)
            .transpose()
            .context("invalid end time")?;

        Ok(EventInput {
            summary: self.summary.filter(|s| !s.is_empty()),
            description: self.description.filter(|s| !s.is_empty()),
            location: self.location.filter(|s| !s.is_empty()),
            start,
            end,
            all_day: self.all_day,
            attendees: self.attendees,
        })
    }
}

#[derive(Subcommand)]
enum CalCommands {
    /// List calendar events
    #[command(long_about = "List calendar events within a date range.

By default, shows events for the next 7 days.

Examples:
  gaggle cal list                           # Events for next 7 days
  gaggle cal list -a work                   # From work calendar
  gaggle cal list --all                     # From all accounts
  gaggle cal list --from 2024-01-01 --to 2024-01-31")]
    List {
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
        /// List from all accounts
        #[arg(long)]
        all: bool,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Maximum number of events per account
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: u32,
    },
    /// Get event details
    Get {
        /// Event ID
        id: String,
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
    },
    /// Create a new calendar event
    Add {
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
        #[command(flatten)]
        event: EventArgs,
    },
    /// Update an existing calendar event (only provided fields change)
    Update {
        /// Event ID
        id: String,
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
        #[command(flatten)]
        event: EventArgs,
    },
    /// Delete a calendar event
    Delete {
        /// Event ID
        id: String,
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
    },
    /// List available calendars
    Calendars {
        /// Account to use (default: default account)
        #[arg(short = 'a', long)]
        account: Option<String>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Commands::Auth { command } => handle_auth_command(command, format).await,
        Commands::Config { command } => handle_config_command(command, format).await,
        Commands::Mail { command } => handle_mail_command(command, format).await,
        Commands::Cal { command } => handle_cal_command(command, format).await,
    }
}

fn token_store() -> Arc<dyn TokenStore> {
    Arc::new(FileTokenStore::new())
}

/// Resolve the accounts a fan-out command targets
fn select_accounts(config: &Config, account: Option<&str>, all: bool) -> Result<Vec<String>> {
    if !config.has_accounts() {
        bail!("no accounts configured. Run 'gaggle auth add <name>' first");
    }
    if all {
        Ok(config.account_names())
    } else {
        let (name, _) = config.get_account(account)?;
        Ok(vec![name])
    }
}

// ============================================================================
// Auth Command Handlers
// ============================================================================

async fn handle_auth_command(command: AuthCommands, format: OutputFormat) -> Result<()> {
    match command {
        AuthCommands::Add {
            name,
            client_id,
            client_secret,
            calendar_id,
        } => auth_add(&name, client_id, client_secret, calendar_id).await,
        AuthCommands::List => auth_list(format).await,
        AuthCommands::Remove { name } => {
            let mut config = Config::load()?;
            config.remove_account(&name)?;
            config.save()?;
            token_store().delete_tokens(&name).await?;
            output::print_success(&format!("Account '{}' removed", name));
            Ok(())
        }
        AuthCommands::Default { name } => {
            let mut config = Config::load()?;
            config.set_default(&name)?;
            config.save()?;
            output::print_success(&format!("Default account set to '{}'", name));
            Ok(())
        }
        AuthCommands::Reauth { name } => {
            let config = Config::load()?;
            let (name, account) = config.get_account(Some(&name))?;
            token_store().delete_tokens(&name).await?;
            authenticate(&name, &account)
                .await
                .context("authentication failed")?;
            output::print_success(&format!("Account '{}' re-authenticated", name));
            Ok(())
        }
    }
}

async fn auth_add(
    name: &str,
    client_id: Option<String>,
    client_secret: Option<String>,
    calendar_id: Option<String>,
) -> Result<()> {
    let mut config = Config::load()?;
    if config.accounts.contains_key(name) {
        bail!(
            "account '{}' already exists. Use 'gaggle auth remove {}' first",
            name,
            name
        );
    }

    // Prompt for credentials if not provided
    let client_id = match client_id {
        Some(id) => id,
        None => dialoguer::Input::new()
            .with_prompt("Google OAuth client ID")
            .interact_text()?,
    };
    let client_secret = match client_secret {
        Some(secret) => secret,
        None => dialoguer::Input::new()
            .with_prompt("Google OAuth client secret")
            .interact_text()?,
    };
    if client_id.trim().is_empty() || client_secret.trim().is_empty() {
        bail!("client ID and client secret are required");
    }

    let account = AccountConfig {
        client_id: client_id.trim().to_string(),
        client_secret: client_secret.trim().to_string(),
        calendar_id,
    };
    config.add_account(name, account.clone())?;
    config.save()?;

    if let Err(e) = authenticate(name, &account).await {
        // Roll the account back so a failed flow leaves no half-added entry
        let _ = config.remove_account(name);
        let _ = config.save();
        return Err(e.context("authentication failed"));
    }

    output::print_success(&format!("Account '{}' added and authenticated", name));
    Ok(())
}

async fn auth_list(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;
    let tokens = token_store();

    let mut accounts = Vec::new();
    for name in config.account_names() {
        let account = &config.accounts[&name];
        accounts.push(AccountInfo {
            is_default: config.default_account.as_deref() == Some(name.as_str()),
            has_token: tokens.has_tokens(&name).await.unwrap_or(false),
            calendar_id: account.calendar_id.clone(),
            name,
        });
    }

    output::print_account_list(&accounts, format);
    Ok(())
}

/// Run the browser OAuth flow for an account and store the tokens
async fn authenticate(name: &str, account: &AccountConfig) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    let oauth = OAuthManager::new(name, account, token_store());
    let state = format!("gaggle_{}", uuid::Uuid::new_v4());
    let auth_url = oauth.authorization_url(&state);

    println!("\n🔐 Opening browser for Google authentication...\n");
    println!("If the browser doesn't open, visit this URL manually:");
    println!("{}\n", auth_url);

    if let Err(e) = open::that(&auth_url) {
        eprintln!("Failed to open browser: {}", e);
    }

    let listener = TcpListener::bind("127.0.0.1:8085")
        .await
        .context("could not bind the OAuth callback port 8085")?;
    println!("⏳ Waiting for authentication callback on http://localhost:8085 ...\n");

    // Accept one connection, with a timeout
    let callback = tokio::time::timeout(std::time::Duration::from_secs(300), async {
        let (mut socket, _) = listener.accept().await?;
        let mut reader = BufReader::new(&mut socket);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;

        let (code, received_state) = parse_oauth_callback(&request_line)?;

        if received_state != state {
            let response =
                "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n<h1>Error: invalid state</h1>";
            socket.write_all(response.as_bytes()).await?;
            anyhow::bail!("OAuth state mismatch");
        }

        let success = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
            <!DOCTYPE html><html><body style='font-family: sans-serif; padding: 40px; text-align: center;'>\
            <h1>Authentication successful!</h1><p>You can close this window and return to the terminal.</p></body></html>";
        socket.write_all(success.as_bytes()).await?;

        Ok::<String, anyhow::Error>(code)
    })
    .await;

    let code = match callback {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => return Err(e),
        Err(_) => bail!("authentication timed out after 5 minutes"),
    };

    println!("✅ Received authorization code, exchanging for tokens...");
    oauth.exchange_code(&code).await?;
    Ok(())
}

/// Parse the authorization code and state out of the callback request line
fn parse_oauth_callback(request_line: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        bail!("invalid HTTP request");
    }

    let path = parts[1];
    if !path.starts_with("/callback") {
        bail!("unexpected callback path: {}", path);
    }

    let query_start = path.find('?').ok_or_else(|| anyhow!("no query string"))?;
    let query = &path[query_start + 1..];

    let mut code = None;
    let mut state = None;
    for param in query.split('&') {
        let mut kv = param.splitn(2, '=');
        let key = kv.next().unwrap_or("");
        let value = kv.next().unwrap_or("");
        match key {
            "code" => code = Some(urlencoding::decode(value).unwrap_or_default().into_owned()),
            "state" => state = Some(urlencoding::decode(value).unwrap_or_default().into_owned()),
            _ => {}
        }
    }

    let code = code.ok_or_else(|| anyhow!("no authorization code in callback"))?;
    let state = state.ok_or_else(|| anyhow!("no state in callback"))?;
    Ok((code, state))
}

// ============================================================================
// Config Command Handlers
// ============================================================================

async fn handle_config_command(command: ConfigCommands, format: OutputFormat) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = Config::load()?;

            if format == OutputFormat::Json {
                output::print_json(&config);
                return Ok(());
            }

            println!(
                "Configuration directory: {}\n",
                gaggle_core::config::config_dir().display()
            );

            if !config.has_accounts() {
                println!("No accounts configured.");
                println!("\nRun 'gaggle auth add <name>' to add an account.");
                return Ok(());
            }

            println!(
                "Default account: {}\n",
                config.default_account.as_deref().unwrap_or("-")
            );
            println!("Accounts:");
            for name in config.account_names() {
                let account = &config.accounts[&name];
                let marker = if config.default_account.as_deref() == Some(name.as_str()) {
                    " (default)"
                } else {
                    ""
                };
                println!("  {}{}", name, marker);
                println!("    Calendar ID: {}", account.calendar_id());
                let id_preview: String = account.client_id.chars().take(20).collect();
                println!("    Client ID: {}...", id_preview);
            }
            Ok(())
        }
        ConfigCommands::Set { key, value } => config_set(&key, &value),
        ConfigCommands::Path => {
            let path = gaggle_core::config::config_path();
            if format == OutputFormat::Json {
                output::print_json(&serde_json::json!({ "config_path": path }));
            } else {
                println!("{}", path.display());
            }
            Ok(())
        }
    }
}

fn config_set(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;

    if key == "default-account" {
        config.set_default(value)?;
        config.save()?;
        output::print_success(&format!("Default account set to '{}'", value));
        return Ok(());
    }

    // <account>.<property> form
    let (account_name, property) = key
        .rsplit_once('.')
        .ok_or_else(|| anyhow!("unknown configuration key: {}", key))?;

    let mut account = config
        .accounts
        .get(account_name)
        .cloned()
        .ok_or_else(|| anyhow!("account '{}' does not exist", account_name))?;

    match property {
        "calendar-id" => {
            account.calendar_id = Some(value.to_string());
            config.update_account(account_name, account)?;
            config.save()?;
            output::print_success(&format!(
                "Calendar ID for '{}' set to '{}'",
                account_name, value
            ));
            Ok(())
        }
        _ => bail!(
            "unknown property '{}' for account '{}'",
            property,
            account_name
        ),
    }
}

// ============================================================================
// Mail Command Handlers
// ============================================================================

async fn handle_mail_command(command: MailCommands, format: OutputFormat) -> Result<()> {
    match command {
        MailCommands::Read {
            account,
            all,
            query,
            limit,
        } => mail_read(account, all, query, limit, format).await,
        MailCommands::Get { id, account } => {
            let config = Config::load()?;
            let (name, account_config) = config.get_account(account.as_deref())?;
            let client = GmailClient::connect(&name, &account_config, token_store()).await?;
            let email = client.get_message(&id).await?;
            output::print_email_detail(&email, format);
            Ok(())
        }
        MailCommands::Draft { account, compose } => {
            let email = compose.into_outgoing()?;
            let config = Config::load()?;
            let (name, account_config) = config.get_account(account.as_deref())?;
            let client = GmailClient::connect(&name, &account_config, token_store()).await?;
            let draft_id = client.create_draft(&email).await?;
            if format == OutputFormat::Json {
                output::print_json(&serde_json::json!({ "draft_id": draft_id, "account": name }));
            } else {
                output::print_success(&format!("Draft created (ID: {})", draft_id));
            }
            Ok(())
        }
        MailCommands::Send { draft_id, account } => {
            let config = Config::load()?;
            let (name, account_config) = config.get_account(account.as_deref())?;
            let client = GmailClient::connect(&name, &account_config, token_store()).await?;
            let message_id = client.send_draft(&draft_id).await?;
            if format == OutputFormat::Json {
                output::print_json(
                    &serde_json::json!({ "message_id": message_id, "account": name }),
                );
            } else {
                output::print_success(&format!("Email sent (Message ID: {})", message_id));
            }
            Ok(())
        }
        MailCommands::SendNow { account, compose } => {
            let email = compose.into_outgoing()?;
            let config = Config::load()?;
            let (name, account_config) = config.get_account(account.as_deref())?;
            let client = GmailClient::connect(&name, &account_config, token_store()).await?;
            let message_id = client.send_message(&email).await?;
            if format == OutputFormat::Json {
                output::print_json(
                    &serde_json::json!({ "message_id": message_id, "account": name }),
                );
            } else {
                output::print_success(&format!("Email sent (Message ID: {})", message_id));
            }
            Ok(())
        }
        MailCommands::Schedule {
            account,
            compose,
            at,
        } => mail_schedule(account, compose, &at, format).await,
        MailCommands::Scheduled { command } => handle_scheduled_command(command, format).await,
    }
}

async fn mail_read(
    account: Option<String>,
    all: bool,
    query: Option<String>,
    limit: u32,
    format: OutputFormat,
) -> Result<()> {
    let config = Config::load()?;
    let accounts = select_accounts(&config, account.as_deref(), all)?;

    let config = Arc::new(config);
    let tokens = token_store();
    let query = Arc::new(query);

    let mut result = fanout::query_accounts(accounts, |name| {
        let config = Arc::clone(&config);
        let tokens = Arc::clone(&tokens);
        let query = Arc::clone(&query);
        async move {
            let (name, account_config) = config.get_account(Some(&name))?;
            let client = GmailClient::connect(&name, &account_config, tokens).await?;
            client.list_messages(query.as_deref(), limit).await
        }
    })
    .await;

    for error in &result.errors {
        output::print_error(&error.to_string());
    }

    result.sort_by_key(|e| e.date);
    output::print_email_list(&result.items, format);
    Ok(())
}

async fn mail_schedule(
    account: Option<String>,
    compose: ComposeArgs,
    at: &str,
    format: OutputFormat,
) -> Result<()> {
    let email = compose.into_outgoing()?;

    let scheduled_at = parse_datetime(at).context("invalid schedule time")?;
    if scheduled_at <= Utc::now() {
        bail!("schedule time must be in the future");
    }

    let config = Config::load()?;
    let (name, account_config) = config.get_account(account.as_deref())?;

    // The draft is created now; the store entry replays it later
    let client = GmailClient::connect(&name, &account_config, token_store()).await?;
    let draft_id = client.create_draft(&email).await?;

    let store = ScheduleStore::new();
    let scheduled = store.add(ScheduleRequest {
        account: name,
        draft_id: draft_id.clone(),
        to: email.to,
        cc: email.cc,
        bcc: email.bcc,
        subject: email.subject,
        body: email.body,
        is_html: email.is_html,
        scheduled_at,
    })?;

    if format == OutputFormat::Json {
        output::print_json(&scheduled);
    } else {
        output::print_success(&format!(
            "Email scheduled for {}",
            scheduled_at
                .with_timezone(&Local)
                .format("%a, %d %b %Y %H:%M %Z")
        ));
        output::print_info(&format!("Draft ID: {}", draft_id));
        output::print_info("Run 'gaggle mail scheduled send' to send scheduled emails when ready");
    }
    Ok(())
}

async fn handle_scheduled_command(command: ScheduledCommands, format: OutputFormat) -> Result<()> {
    match command {
        ScheduledCommands::List { account, pending } => {
            let store = ScheduleStore::new();
            let mut emails = store.list_by_account(account.as_deref())?;
            if pending {
                emails.retain(|e| e.is_pending());
            }
            output::print_scheduled_list(&emails, format);
            Ok(())
        }
        ScheduledCommands::Send { account, dry_run } => {
            let store = ScheduleStore::new();
            let config = Config::load()?;
            let sender = Arc::new(AccountDraftSender::new(config, token_store()));
            let dispatcher = Dispatcher::new(&store, sender);

            let report = dispatcher
                .run(account.as_deref(), dry_run, Utc::now())
                .await?;
            output::print_dispatch_report(&report, format);

            // Partial failure is routine; only a fully failed batch is an error
            if !report.dry_run && report.failed > 0 && report.sent == 0 {
                bail!("all {} scheduled send(s) failed", report.failed);
            }
            Ok(())
        }
        ScheduledCommands::Clear { account, sent, all } => {
            let store = ScheduleStore::new();
            if sent {
                store.clear_sent(account.as_deref())?;
                output::print_success("Cleared sent scheduled emails");
            } else if all {
                store.clear_all(account.as_deref())?;
                output::print_success("Cleared all scheduled emails");
            } else {
                bail!("specify --sent to clear sent emails or --all to clear all");
            }
            Ok(())
        }
    }
}

// ============================================================================
// Calendar Command Handlers
// ============================================================================

async fn handle_cal_command(command: CalCommands, format: OutputFormat) -> Result<()> {
    match command {
        CalCommands::List {
            account,
            all,
            from,
            to,
            limit,
        } => cal_list(account, all, from, to, limit, format).await,
        CalCommands::Get { id, account } => {
            let config = Config::load()?;
            let (name, account_config) = config.get_account(account.as_deref())?;
            let client = CalendarClient::connect(&name, &account_config, token_store()).await?;
            let event = client.get_event(&id).await?;
            output::print_event_detail(&event, format);
            Ok(())
        }
        CalCommands::Add { account, event } => {
            let input = event.into_input()?;
            if input.summary.is_none() {
                bail!("summary is required (--summary)");
            }
            if input.start.is_none() {
                bail!("start time is required (--start)");
            }
            if input.end.is_none() {
                bail!("end time is required (--end)");
            }

            let config = Config::load()?;
            let (name, account_config) = config.get_account(account.as_deref())?;
            let client = CalendarClient::connect(&name, &account_config, token_store()).await?;
            let event_id = client.create_event(&input).await?;
            if format == OutputFormat::Json {
                output::print_json(&serde_json::json!({ "event_id": event_id, "account": name }));
            } else {
                output::print_success(&format!("Event created (ID: {})", event_id));
            }
            Ok(())
        }
        CalCommands::Update { id, account, event } => {
            let input = event.into_input()?;
            let config = Config::load()?;
            let (name, account_config) = config.get_account(account.as_deref())?;
            let client = CalendarClient::connect(&name, &account_config, token_store()).await?;
            client.update_event(&id, &input).await?;
            output::print_success("Event updated");
            Ok(())
        }
        CalCommands::Delete { id, account } => {
            let config = Config::load()?;
            let (name, account_config) = config.get_account(account.as_deref())?;
            let client = CalendarClient::connect(&name, &account_config, token_store()).await?;
            client.delete_event(&id).await?;
            output::print_success("Event deleted");
            Ok(())
        }
        CalCommands::Calendars { account } => {
            let config = Config::load()?;
            let (name, account_config) = config.get_account(account.as_deref())?;
            let client = CalendarClient::connect(&name, &account_config, token_store()).await?;
            let calendars = client.list_calendars().await?;
            output::print_calendar_list(&name, &calendars, format);
            Ok(())
        }
    }
}

async fn cal_list(
    account: Option<String>,
    all: bool,
    from: Option<String>,
    to: Option<String>,
    limit: u32,
    format: OutputFormat,
) -> Result<()> {
    // Parse the range before touching the network or any account
    let from = match from.as_deref() {
        Some(s) => parse_date(s).context("invalid --from date")?,
        None => Utc::now(),
    };
    let to = match to.as_deref() {
        // Include the whole end day
        Some(s) => parse_date(s).context("invalid --to date")? + Duration::days(1) - Duration::seconds(1),
        None => from + Duration::days(7),
    };

    let config = Config::load()?;
    let accounts = select_accounts(&config, account.as_deref(), all)?;

    let config = Arc::new(config);
    let tokens = token_store();

    let mut result = fanout::query_accounts(accounts, |name| {
        let config = Arc::clone(&config);
        let tokens = Arc::clone(&tokens);
        async move {
            let (name, account_config) = config.get_account(Some(&name))?;
            let client = CalendarClient::connect(&name, &account_config, tokens).await?;
            client.list_events(from, to, limit).await
        }
    })
    .await;

    for error in &result.errors {
        output::print_error(&error.to_string());
    }

    result.sort_by_key(|e| e.start);
    output::print_event_list(&result.items, format);
    Ok(())
}

// ============================================================================
// Date Parsing
// ============================================================================

/// Parse a datetime: RFC 3339, or a naive form interpreted in local time
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return Ok(local.with_timezone(&Utc));
            }
        }
    }

    Err(gaggle_core::Error::InvalidDate(format!("{} (use ISO 8601, e.g. 2024-12-25T10:00:00)", s)).into())
}

/// Parse a date (local midnight)
fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();

    const FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            let naive = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow!("invalid date: {}", s))?;
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return Ok(local.with_timezone(&Utc));
            }
        }
    }

    Err(gaggle_core::Error::InvalidDate(format!("{} (use YYYY-MM-DD format)", s)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_rfc3339() {
        let parsed = parse_datetime("2024-12-25T10:00:00+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-12-25T08:00:00+00:00");
    }

    #[test]
    fn test_parse_datetime_naive_forms() {
        for input in [
            "2024-12-25T10:00:00",
            "2024-12-25 10:00:00",
            "2024-12-25T10:00",
            "2024-12-25 10:00",
        ] {
            let parsed = parse_datetime(input).unwrap();
            let local = parsed.with_timezone(&Local);
            assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2024-12-25 10:00");
        }
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        assert!(parse_datetime("next tuesday").is_err());
        assert!(parse_datetime("").is_err());
    }

    #[test]
    fn test_parse_date_forms() {
        let iso = parse_date("2024-01-31").unwrap().with_timezone(&Local);
        assert_eq!(iso.format("%Y-%m-%d %H:%M").to_string(), "2024-01-31 00:00");

        let us = parse_date("01/31/2024").unwrap().with_timezone(&Local);
        assert_eq!(us.format("%Y-%m-%d").to_string(), "2024-01-31");

        assert!(parse_date("31/01/2024").is_err());
    }

    #[test]
    fn test_parse_oauth_callback() {
        let (code, state) =
            parse_oauth_callback("GET /callback?code=abc%2F123&state=gaggle_x HTTP/1.1").unwrap();
        assert_eq!(code, "abc/123");
        assert_eq!(state, "gaggle_x");
    }

    #[test]
    fn test_parse_oauth_callback_rejects_other_paths() {
        assert!(parse_oauth_callback("GET /favicon.ico HTTP/1.1").is_err());
        assert!(parse_oauth_callback("GET /callback HTTP/1.1").is_err());
        assert!(parse_oauth_callback("garbage").is_err());
    }

    #[test]
    fn test_compose_args_validation() {
        let base = ComposeArgs {
            to: vec!["a@example.com".to_string()],
            cc: vec![],
            bcc: vec![],
            subject: Some("s".to_string()),
            body: Some("b".to_string()),
            html: false,
        };

        assert!(base.clone().into_outgoing().is_ok());

        let mut missing_to = base.clone();
        missing_to.to.clear();
        assert!(missing_to.into_outgoing().is_err());

        let mut missing_subject = base.clone();
        missing_subject.subject = None;
        assert!(missing_subject.into_outgoing().is_err());

        let mut missing_body = base;
        missing_body.body = None;
        assert!(missing_body.into_outgoing().is_err());
    }

    #[test]
    fn test_compose_args_html_detection() {
        let compose = ComposeArgs {
            to: vec!["a@example.com".to_string()],
            cc: vec![],
            bcc: vec![],
            subject: Some("s".to_string()),
            body: Some("see [the docs](https://example.com)".to_string()),
            html: false,
        };
        assert!(compose.into_outgoing().unwrap().is_html);
    }
}
