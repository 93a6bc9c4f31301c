//! Command-line client for the clip marketplace runtime services.
//!
//! Signs in (demo or live mode, decided by the environment), optionally
//! fetches a backend path through the HTTP client and optionally follows the
//! realtime channel until interrupted.

use anyhow::{Context, Result, bail};
use clipmarket::{
    api::{ApiClient, ApiResponse, RetryPolicy, with_retry},
    auth::{AuthController, AuthState, AuthUser, RegisterRequest, UserRole},
    config::{ProviderConfig, RuntimeConfig},
    realtime::{
        ANY_MESSAGE, CONNECTED, DISCONNECTED, MAX_RECONNECT_ATTEMPTS, NotificationCenter,
        RECONNECTING, RealtimeClient,
    },
};
use pico_args::Arguments;
use std::{
    io::{self, Write},
    sync::Arc,
    time::Duration,
};
use tokio::sync::{mpsc, watch};

mod logging;

const HELP: &str = "\
Talk to the clip marketplace backend from the terminal

USAGE:
  cm_client [OPTIONS]

OPTIONS:
  --email EMAIL         Sign in with this email
  --password PASS       Password for --email (prompted if omitted)
  --register NAME       Create an account with this username before signing in
  --role ROLE           Role for --register: creator, clipper  [default: creator]
  --get PATH            Fetch PATH from the HTTP backend and print the envelope
  --watch               Follow the realtime channel until Ctrl-C
  --demo                Use demo mode even if an identity provider is configured

FLAGS:
  -h, --help            Print help information

ENVIRONMENT:
  IDENTITY_PROVIDER_URL, IDENTITY_PROVIDER_KEY   Live mode when both are usable
  API_BASE_URL, REALTIME_URL                     Backend endpoints
  RUST_LOG                                       Log filter
";

/// Upper bound on waiting for a sign-in to settle
const SIGN_IN_WAIT: Duration = Duration::from_secs(15);

struct Args {
    email: Option<String>,
    password: Option<String>,
    register: Option<String>,
    role: UserRole,
    get: Option<String>,
    watch: bool,
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let args = Args {
        email: pargs.opt_value_from_str("--email")?,
        password: pargs.opt_value_from_str("--password")?,
        register: pargs.opt_value_from_str("--register")?,
        role: pargs
            .opt_value_from_str("--role")?
            .unwrap_or(UserRole::Creator),
        get: pargs.opt_value_from_str("--get")?,
        watch: pargs.contains("--watch"),
        demo: pargs.contains("--demo"),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        bail!("Unexpected arguments: {:?}", remaining);
    }

    logging::init();
    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let mut config = RuntimeConfig::from_env().context("Invalid configuration")?;
    if args.demo {
        config.provider = ProviderConfig::default();
    }
    let auth = Arc::new(AuthController::new(&config));

    let _transitions = auth.subscribe(|state| {
        tracing::info!(
            initialized = state.is_initialized,
            loading = state.is_loading,
            user = state.user.as_ref().map(|user| user.email.as_str()),
            error = state.error.as_deref(),
            "Auth state changed"
        );
    });

    auth.initialize().await;
    println!(
        "Mode: {}",
        if auth.is_demo_mode() { "demo" } else { "live" }
    );
    if let Some(error) = auth.state().error {
        println!("Session restore failed: {error}");
    }

    if let Some(email) = args.email {
        let password = match args.password {
            Some(password) => password,
            None => prompt("Password: ")?,
        };

        let outcome = match args.register {
            Some(username) => {
                println!("Registering {username}...");
                auth.register(RegisterRequest {
                    email: email.clone(),
                    password: password.clone(),
                    username,
                    role: args.role,
                    channel_link: None,
                })
                .await
            }
            None => {
                println!("Signing in as {email}...");
                auth.login(&email, &password).await
            }
        };
        if !outcome.success {
            bail!(
                "Authentication failed: {}",
                outcome.error.unwrap_or_default()
            );
        }

        let state = wait_until_settled(&auth).await?;
        if let Some(error) = state.error {
            bail!("Authentication failed: {error}");
        }
    }

    match auth.user() {
        Some(user) => print_user(&user),
        None => println!("Not signed in"),
    }

    if let Some(path) = args.get {
        let api = ApiClient::new(&config.api, auth.clone());
        let response: ApiResponse<serde_json::Value> =
            with_retry(RetryPolicy::default(), || api.get(&path)).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    if args.watch {
        follow_channel(&config, Arc::clone(&auth)).await?;
    }

    Ok(())
}

/// Wait for the in-flight sign-in to finish loading.
///
/// Live sign-ins complete asynchronously once the provider announces the
/// session and the profile has loaded.
async fn wait_until_settled(auth: &AuthController) -> Result<AuthState> {
    let (tx, mut rx) = watch::channel(auth.state());
    let subscription = auth.subscribe(move |state| {
        let _ = tx.send(state.clone());
    });

    let settled = tokio::time::timeout(SIGN_IN_WAIT, rx.wait_for(|state| !state.is_loading))
        .await
        .context("Timed out waiting for the session")?
        .context("Auth state stream ended")?
        .clone();
    subscription.unsubscribe();
    Ok(settled)
}

fn print_user(user: &AuthUser) {
    println!("Signed in as {} <{}> ({})", user.username, user.email, user.role);
    if let Some(link) = &user.channel_link {
        println!("  Channel: {link}");
    }
}

async fn follow_channel(config: &RuntimeConfig, auth: Arc<AuthController>) -> Result<()> {
    let client = RealtimeClient::new(config.realtime.clone(), auth);
    let center = Arc::new(NotificationCenter::new());

    let _inbox = center.attach(&client);
    let _messages = client.on(ANY_MESSAGE, |message| {
        println!(
            "[{}] {} {}",
            message.timestamp.to_rfc3339(),
            message.kind,
            message.payload
        );
    });
    let _lifecycle: Vec<_> = [CONNECTED, DISCONNECTED, RECONNECTING]
        .into_iter()
        .map(|kind| {
            client.on(kind, |event| {
                tracing::info!(payload = %event.payload, "Channel {}", event.kind);
            })
        })
        .collect();

    let (gave_up_tx, mut gave_up_rx) = mpsc::unbounded_channel();
    let _gave_up = client.on(MAX_RECONNECT_ATTEMPTS, move |_| {
        let _ = gave_up_tx.send(());
    });

    if !client.connect() {
        bail!("The realtime channel needs a signed-in user");
    }
    println!("Following {} (Ctrl-C to stop)", config.realtime.url);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
        }
        _ = gave_up_rx.recv() => {
            tracing::warn!("Realtime channel gave up reconnecting");
        }
    }

    client.disconnect().await;
    println!(
        "{} notifications received, {} unread",
        center.list().len(),
        center.unread_count()
    );
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
