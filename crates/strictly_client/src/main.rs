//! Strictly Client - terminal front end for the sync engine.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use strictly_board::{GameId, GameSnapshot, GameStatus, derive_view};
use strictly_client::{
    ActionOutcome, ApiClient, ClientConfig, ClientError, FileTokenStorage,
    GameBackend, GameSyncController, LobbyController, Registration, ReqwestTransport,
    SessionEvent, SessionStore, poll_interval,
};
use tracing::{debug, info, instrument};
use tracing_subscriber::EnvFilter;

type Api = ApiClient<ReqwestTransport>;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load(cli.config.as_deref())?
        .with_overrides(cli.server_url.clone(), cli.token_path.clone());
    debug!(?config, "Configuration resolved");

    let session = Arc::new(SessionStore::new(FileTokenStorage::new(config.token_path())));
    session.restore();
    let transport = ReqwestTransport::new(config.server_url(), config.request_timeout())?;
    let api = Arc::new(ApiClient::new(transport, session.clone()));

    run(cli.command, &config, &session, &api)
        .await
        .map_err(|e| match e.downcast::<ClientError>() {
            Ok(client) => anyhow::anyhow!(client.user_message()),
            Err(other) => other,
        })
}

#[instrument(skip_all)]
async fn run(
    command: Command,
    config: &ClientConfig,
    session: &Arc<SessionStore>,
    api: &Arc<Api>,
) -> Result<()> {
    match command {
        Command::Register {
            username,
            password,
            display_name,
        } => {
            let profile = session
                .register(api.as_ref(), Registration::new(username, password, display_name))
                .await?;
            println!("Registered and signed in as {}", profile.label());
            warn_unpersisted(session);
        }
        Command::Login { username, password } => {
            let profile = session.authenticate(api.as_ref(), &username, &password).await?;
            println!("Signed in as {}", profile.label());
            warn_unpersisted(session);
        }
        Command::Logout => {
            session.logout(api.as_ref()).await;
            println!("Signed out");
        }
        Command::Whoami => {
            let profile = session.reload_profile(api.as_ref()).await?;
            println!(
                "{} (@{}) rating {} | {}W {}L {}D",
                profile.label(),
                profile.username(),
                profile.rating(),
                profile.wins(),
                profile.losses(),
                profile.draws()
            );
        }
        Command::Rename { display_name } => {
            let profile = session
                .update_display_name(api.as_ref(), &display_name)
                .await?;
            println!("Display name is now {}", profile.label());
        }
        Command::Open => {
            let lobby = LobbyController::new(api.clone(), session.clone(), None);
            lobby.mount().await?;
            let games = lobby.open_games();
            lobby.unmount();
            if games.is_empty() {
                println!("No open games");
            }
            for game in games {
                println!("#{} created by member {}", game.id(), game.creator());
            }
        }
        Command::Create => {
            let game = api.create_game().await?;
            println!("Created game #{}", game.id);
        }
        Command::Join { game_id } => {
            let controller = open_game(session, api, game_id).await?;
            let outcome = controller.join().await;
            controller.unmount();
            if let Some(snapshot) = completed(outcome?)? {
                print_snapshot(session, &snapshot);
            }
        }
        Command::Show { game_id } => {
            let snapshot = api.fetch_game(game_id).await?;
            load_profile(session, api).await;
            print_snapshot(session, &snapshot);
        }
        Command::Move { game_id, position } => {
            let controller = open_game(session, api, game_id).await?;
            let outcome = controller.make_move(position).await;
            controller.unmount();
            if let Some(snapshot) = completed(outcome?)? {
                print_snapshot(session, &snapshot);
            }
        }
        Command::Close { game_id } => {
            let controller = open_game(session, api, game_id).await?;
            let outcome = controller.close().await;
            controller.unmount();
            if completed(outcome?)?.is_some() {
                println!("Game #{} closed", game_id);
            }
        }
        Command::Rematch { game_id } => {
            let controller = open_game(session, api, game_id).await?;
            let outcome = controller.rematch().await;
            controller.unmount();
            if let Some(new_id) = completed(outcome?)? {
                println!("Rematch started: game #{}", new_id);
            }
        }
        Command::Watch { game_id, poll_ms } => {
            let interval = match poll_ms {
                Some(ms) => poll_interval(ms),
                None => config.game_interval(),
            };
            watch(session, api, game_id, interval).await?;
        }
        Command::History { limit, offset } => {
            let page = api.my_games(limit, offset).await?;
            if let Some(total) = page.total {
                println!("{} games in total", total);
            }
            for game in page.items {
                let view = derive_view(&game, session.profile().as_ref());
                println!("#{} {}", game.id(), view.status_text());
            }
        }
        Command::Leaderboard => {
            let page = api.leaderboard().await?;
            for (rank, member) in page.items.iter().enumerate() {
                println!(
                    "{:>3}. {:<20} {:>5} ({}W {}L {}D)",
                    rank + 1,
                    member.label(),
                    member.rating(),
                    member.wins(),
                    member.losses(),
                    member.draws()
                );
            }
        }
    }
    Ok(())
}

/// Loads the profile for a restored token so views know who is looking.
async fn load_profile(session: &SessionStore, api: &Api) {
    if session.is_authenticated()
        && session.profile().is_none()
        && let Err(e) = session.reload_profile(api).await
    {
        debug!(error = %e, "Profile unavailable, continuing anonymously");
    }
}

/// Mounts a non-polling controller for a one-shot action.
async fn open_game(
    session: &Arc<SessionStore>,
    api: &Arc<Api>,
    game_id: GameId,
) -> Result<Arc<GameSyncController<Api>>> {
    load_profile(session, api).await;
    let controller = GameSyncController::new(game_id, api.clone(), session.clone(), None);
    controller.mount().await?;
    Ok(controller)
}

fn completed<T>(outcome: ActionOutcome<T>) -> Result<Option<T>> {
    match outcome {
        ActionOutcome::Completed(value) => Ok(Some(value)),
        ActionOutcome::Busy => bail!("Another action is still in progress"),
        ActionOutcome::Discarded => Ok(None),
    }
}

fn print_snapshot(session: &SessionStore, snapshot: &GameSnapshot) {
    let view = derive_view(snapshot, session.profile().as_ref());
    println!("Game #{}: {}", snapshot.id(), view.status_text());
    if let Some(symbol) = view.your_symbol() {
        println!("You play {}", symbol);
    }
    println!("{}", snapshot.board().display());
    if *view.is_your_turn() {
        let cells: Vec<String> = view.legal_cells().iter().map(ToString::to_string).collect();
        println!("Your move: {}", cells.join(", "));
    }
}

fn warn_unpersisted(session: &SessionStore) {
    if !session.is_persisted() {
        eprintln!("Warning: session not persisted; you will need to sign in again next time");
    }
}

/// Follows a game until it closes, the session ends or Ctrl-C.
#[instrument(skip(session, api))]
async fn watch(
    session: &Arc<SessionStore>,
    api: &Arc<Api>,
    game_id: GameId,
    interval: Option<std::time::Duration>,
) -> Result<()> {
    load_profile(session, api).await;
    let controller = GameSyncController::new(game_id, api.clone(), session.clone(), interval);
    let mut snapshots = controller.subscribe();
    let mut events = session.subscribe();

    controller
        .mount()
        .await
        .with_context(|| format!("Could not load game #{}", game_id))?;
    info!(game_id, "Watching game");

    let mut last_error = None;
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = snapshots.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    print_snapshot(session, &snapshot);
                    if *snapshot.status() == GameStatus::Closed {
                        break;
                    }
                }
            }
            event = events.recv() => {
                if let Ok(SessionEvent::RedirectToLogin) = event {
                    controller.unmount();
                    bail!("Session expired; sign in again");
                }
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {
                let error = controller.last_error();
                if let Some(message) = &error
                    && error != last_error
                {
                    eprintln!("{}", message);
                }
                last_error = error;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    controller.unmount();
    Ok(())
}
