//! tictactoe_sync - command-line client
//!
//! Each invocation acts as the anonymous participant stored in the
//! identity file, against the SQLite database named in the config.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use tictactoe_sync::{
    Coordinator, EphemeralIdentity, FileIdentity, GameId, GameRecord, GameStatus, GameStore,
    JoinOutcome, LocalView, Lobby, MemoryStore, MoveOutcome, SqliteStore, SyncConfig, UserId,
};
use tracing::{info, instrument, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SyncConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config = config.with_database_path(db);
    }
    initialize_tracing(config.log_filter());

    match cli.command {
        Command::Demo => run_demo().await,
        command => run_command(command, &config).await,
    }
}

/// Logs go to stderr so `show --json` output stays parseable.
fn initialize_tracing(fallback: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run a command against the configured SQLite store.
#[instrument(skip_all, fields(database = %config.database_path()))]
async fn run_command(command: Command, config: &SyncConfig) -> Result<()> {
    let store = SqliteStore::open(config.database_path().clone(), config.poll_interval())?;
    let identity = FileIdentity::new(config.identity_path().clone());
    let lobby = Lobby::for_identity(Arc::new(store), &identity).await?;
    info!(user_id = %lobby.user_id(), "Acting as participant");

    match command {
        Command::Create => {
            let record = lobby.create_game().await?;
            println!("{}", record.id());
        }
        Command::Open => {
            for record in lobby.open_games().await? {
                println!(
                    "{}  by {}  created {}",
                    record.id(),
                    record.creator_id(),
                    record.created_at().format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Mine { watch: false } => print_my_games(&lobby).await?,
        Command::Mine { watch: true } => watch_my_games(&lobby).await?,
        Command::Join { game_id } => {
            let coordinator = lobby.open(GameId::from(game_id)).await?;
            match coordinator.join_game().await {
                Ok(JoinOutcome::Joined(record)) => {
                    println!("Joined {} as O", record.id());
                    print_record(&record, lobby.user_id());
                }
                Ok(JoinOutcome::Ignored(reason)) => println!("Not joined: {}", reason),
                Err(e) if e.is_condition_failed() => {
                    warn!("Another participant joined first");
                    coordinator.load_game().await?;
                    println!("Game already taken");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Move { game_id, index } => {
            let coordinator = lobby.open(GameId::from(game_id)).await?;
            match coordinator.submit_move(usize::from(index)).await? {
                MoveOutcome::Applied(record) => print_record(&record, lobby.user_id()),
                MoveOutcome::Ignored(reason) => println!("Move ignored: {}", reason),
            }
        }
        Command::Show { game_id, json } => {
            let coordinator = lobby.open(GameId::from(game_id)).await?;
            let view = coordinator
                .view()
                .context("game vanished after loading")?;
            if json {
                println!("{}", serde_json::to_string_pretty(view.record())?);
            } else {
                print_record(view.record(), lobby.user_id());
            }
        }
        Command::Watch { game_id } => {
            watch_game(&lobby.coordinator(GameId::from(game_id))).await?;
        }
        Command::Demo => run_demo().await?,
    }
    Ok(())
}

/// Follow a game until it completes or the user interrupts.
///
/// Subscribes before loading so no change between the two is missed.
#[instrument(skip_all, fields(game_id = %coordinator.game_id()))]
async fn watch_game<S: GameStore + 'static>(coordinator: &Coordinator<S>) -> Result<()> {
    let handle = coordinator.subscribe(|_: &GameRecord| {}).await?;
    coordinator.load_game().await?;

    let mut rx = coordinator.watch();
    loop {
        let done = match rx.borrow_and_update().as_ref() {
            Some(view) => {
                print_record(view.record(), coordinator.user_id());
                println!();
                *view.record().status() == GameStatus::Completed
            }
            None => false,
        };
        if done {
            break;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    handle.cancel();
    Ok(())
}

async fn print_my_games<S: GameStore + 'static>(lobby: &Lobby<S>) -> Result<()> {
    let user = lobby.user_id();
    for record in lobby.my_games().await? {
        let headline = LocalView::authoritative(record.clone()).headline(user);
        println!("{}  {:<9}  {}", record.id(), record.status(), headline);
    }
    Ok(())
}

/// Reprint the caller's games whenever one of them changes.
///
/// Subscribes before the first listing so no change between the two is missed.
#[instrument(skip_all, fields(user_id = %lobby.user_id()))]
async fn watch_my_games<S: GameStore + 'static>(lobby: &Lobby<S>) -> Result<()> {
    let mut subscription = lobby.watch_my_games().await?;
    print_my_games(lobby).await?;
    loop {
        tokio::select! {
            changed = subscription.recv() => {
                let Some(record) = changed else {
                    break;
                };
                info!(game_id = %record.id(), status = %record.status(), "Game changed");
                println!();
                print_my_games(lobby).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}

/// Two in-memory clients play a full game through one shared store.
#[instrument]
async fn run_demo() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let alice = Lobby::for_identity(Arc::clone(&store), &EphemeralIdentity::new()).await?;
    let bob = Lobby::for_identity(Arc::clone(&store), &EphemeralIdentity::new()).await?;

    let game = alice.create_game().await?;
    println!("X ({}) created {}", alice.user_id(), game.id());

    let x = alice.open(game.id().clone()).await?;
    let o = bob.open(game.id().clone()).await?;
    let _x_subscription = x.subscribe(|_: &GameRecord| {}).await?;
    let _o_subscription = o.subscribe(|_: &GameRecord| {}).await?;

    match o.join_game().await? {
        JoinOutcome::Joined(record) => {
            println!("O ({}) joined", bob.user_id());
            wait_for_record(&x, &record).await?;
        }
        JoinOutcome::Ignored(reason) => anyhow::bail!("join ignored: {}", reason),
    }

    let script = [(&x, &o, 0), (&o, &x, 4), (&x, &o, 1), (&o, &x, 3), (&x, &o, 2)];
    for (mover, watcher, index) in script {
        match mover.submit_move(index).await? {
            MoveOutcome::Applied(record) => {
                wait_for_record(watcher, &record).await?;
                println!("{} plays {}", mover.user_id(), index);
                print_record(&record, watcher.user_id());
                println!();
            }
            MoveOutcome::Ignored(reason) => anyhow::bail!("move {} ignored: {}", index, reason),
        }
    }

    if let MoveOutcome::Ignored(reason) = o.submit_move(5).await? {
        println!("Late move by O ignored: {}", reason);
    }
    Ok(())
}

/// Waits until `coordinator`'s view holds `record`.
async fn wait_for_record<S: GameStore + 'static>(
    coordinator: &Coordinator<S>,
    record: &GameRecord,
) -> Result<()> {
    let mut rx = coordinator.watch();
    tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|view| view.as_ref().is_some_and(|view| view.record() == record)),
    )
    .await
    .context("timed out waiting for change notification")??;
    Ok(())
}

fn print_record(record: &GameRecord, user: &UserId) {
    println!("{}", record.board().render());
    println!("{}", LocalView::authoritative(record.clone()).headline(user));
}
