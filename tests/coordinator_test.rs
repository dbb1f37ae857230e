//! Two clients playing through a shared in-memory store.

use std::sync::Arc;
use std::time::Duration;

use tictactoe_sync::tictactoe_rules::IllegalMoveError;
use tictactoe_sync::{
    Coordinator, GameRecord, GameStatus, JoinOutcome, JoinRejection, Lobby, Mark, MemoryStore,
    MoveOutcome, MoveRejection, Outcome, Square, UserId, reconcile,
};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

struct Table {
    store: Arc<MemoryStore>,
    x: Coordinator<MemoryStore>,
    o: Coordinator<MemoryStore>,
}

/// Alice creates a game, Bob joins it, both views loaded.
async fn started_game() -> Table {
    let store = Arc::new(MemoryStore::new());
    let alice = Lobby::new(Arc::clone(&store), UserId::from("alice"));
    let bob = Lobby::new(Arc::clone(&store), UserId::from("bob"));

    let game = alice.create_game().await.expect("create");
    let o = bob.open(game.id().clone()).await.expect("open as bob");
    let joined = o.join_game().await.expect("join");
    assert!(matches!(joined, JoinOutcome::Joined(_)));

    let x = alice.open(game.id().clone()).await.expect("open as alice");
    Table { store, x, o }
}

/// Moves alternately, refreshing the other side from the store.
///
/// Returns the record written by each move, in order.
async fn play(table: &Table, moves: &[usize]) -> Vec<GameRecord> {
    let mut records = Vec::with_capacity(moves.len());
    for (turn, &index) in moves.iter().enumerate() {
        let (mover, other) = if turn % 2 == 0 {
            (&table.x, &table.o)
        } else {
            (&table.o, &table.x)
        };
        mover.load_game().await.expect("load mover");
        match mover.submit_move(index).await.expect("move") {
            MoveOutcome::Applied(record) => records.push(record),
            MoveOutcome::Ignored(reason) => panic!("move {} ignored: {}", index, reason),
        }
        other.load_game().await.expect("load other");
    }
    records
}

#[tokio::test]
async fn test_join_starts_game_with_x_to_move() {
    let table = started_game().await;
    let view = table.x.view().expect("loaded");
    let record = view.record();

    assert_eq!(*record.status(), GameStatus::Started);
    assert_eq!(record.opponent_id().as_ref(), Some(table.o.user_id()));
    assert_eq!(*record.turn_owner(), Mark::X);
    assert_eq!(view.headline(table.x.user_id()), "Your turn!");
    assert_eq!(view.headline(table.o.user_id()), "Opponent's turn...");
}

#[tokio::test]
async fn test_creator_cannot_join_own_game() {
    let store = Arc::new(MemoryStore::new());
    let alice = Lobby::new(store, UserId::from("alice"));
    let game = alice.create_game().await.expect("create");
    let x = alice.open(game.id().clone()).await.expect("open");

    let outcome = x.join_game().await.expect("join");
    assert_eq!(outcome, JoinOutcome::Ignored(JoinRejection::IsCreator));
    assert_eq!(*x.view().expect("loaded").record().status(), GameStatus::Waiting);
}

#[tokio::test]
async fn test_join_started_game_is_ignored() {
    let table = started_game().await;
    let carol = Lobby::new(Arc::clone(&table.store), UserId::from("carol"));
    let late = carol.open(table.x.game_id().clone()).await.expect("open");

    let outcome = late.join_game().await.expect("join");
    assert_eq!(
        outcome,
        JoinOutcome::Ignored(JoinRejection::NotWaiting(GameStatus::Started))
    );
}

#[tokio::test]
async fn test_only_one_concurrent_joiner_wins() {
    let store = Arc::new(MemoryStore::new());
    let alice = Lobby::new(Arc::clone(&store), UserId::from("alice"));
    let game = alice.create_game().await.expect("create");

    let bob = Lobby::new(Arc::clone(&store), UserId::from("bob"))
        .open(game.id().clone())
        .await
        .expect("open as bob");
    let carol = Lobby::new(Arc::clone(&store), UserId::from("carol"))
        .open(game.id().clone())
        .await
        .expect("open as carol");

    let (first, second) = tokio::join!(bob.join_game(), carol.join_game());

    let results = [first, second];
    let winners = results
        .iter()
        .filter(|r| matches!(r, Ok(JoinOutcome::Joined(_))))
        .count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_condition_failed()))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(losers, 1);

    let stored = alice.open(game.id().clone()).await.expect("reload");
    let opponent = stored.view().expect("loaded").record().opponent_id().clone();
    assert!(opponent == Some(UserId::from("bob")) || opponent == Some(UserId::from("carol")));
}

#[tokio::test]
async fn test_turns_alternate() {
    let table = started_game().await;

    let first = table.x.submit_move(0).await.expect("x moves");
    assert!(first.is_applied());

    let again = table.x.submit_move(1).await.expect("x again");
    assert_eq!(again, MoveOutcome::Ignored(MoveRejection::NotYourTurn));

    table.o.load_game().await.expect("reload o");
    let reply = table.o.submit_move(4).await.expect("o moves");
    let MoveOutcome::Applied(record) = reply else {
        panic!("o's move should apply");
    };
    assert_eq!(*record.turn_owner(), Mark::X);
    assert_eq!(record.board().get(4), Some(Square::Occupied(Mark::O)));
}

#[tokio::test]
async fn test_move_on_stale_view_is_ignored() {
    let table = started_game().await;
    table.x.submit_move(0).await.expect("x moves");

    // o has not seen x's move yet, so it still looks like x's turn.
    let stale = table.o.submit_move(4).await.expect("o moves");
    assert_eq!(stale, MoveOutcome::Ignored(MoveRejection::NotYourTurn));
}

#[tokio::test]
async fn test_occupied_square_is_ignored_without_write() {
    let table = started_game().await;
    table.x.submit_move(0).await.expect("x moves");
    table.o.load_game().await.expect("reload");

    let before = table.o.view().expect("loaded");
    let outcome = table.o.submit_move(0).await.expect("o moves");
    assert_eq!(
        outcome,
        MoveOutcome::Ignored(MoveRejection::Illegal(IllegalMoveError::SquareOccupied(0)))
    );
    assert_eq!(table.o.view().expect("loaded"), before);
}

#[tokio::test]
async fn test_move_before_load_is_ignored() {
    let table = started_game().await;
    let fresh = Coordinator::new(
        Arc::clone(&table.store),
        UserId::from("alice"),
        table.x.game_id().clone(),
    );

    let outcome = fresh.submit_move(0).await.expect("move");
    assert_eq!(outcome, MoveOutcome::Ignored(MoveRejection::NotLoaded));
    assert!(fresh.view().is_none());
}

#[tokio::test]
async fn test_full_game_x_wins_and_later_moves_are_ignored() {
    let table = started_game().await;
    let records = play(&table, &[0, 4, 1, 3, 2]).await;

    // (square, mark placed, next turn owner, status) after each move
    let steps = [
        (0, Mark::X, Mark::O, GameStatus::Started),
        (4, Mark::O, Mark::X, GameStatus::Started),
        (1, Mark::X, Mark::O, GameStatus::Started),
        (3, Mark::O, Mark::X, GameStatus::Started),
        (2, Mark::X, Mark::O, GameStatus::Completed),
    ];
    assert_eq!(records.len(), steps.len());
    for (turn, (record, (index, placed, next, status))) in records.iter().zip(steps).enumerate() {
        assert_eq!(record.board().get(index), Some(Square::Occupied(placed)), "move {}", turn);
        assert_eq!(
            record.board().squares().iter().filter(|s| **s != Square::Empty).count(),
            turn + 1,
            "move {}",
            turn
        );
        assert_eq!(*record.turn_owner(), next, "move {}", turn);
        assert_eq!(*record.status(), status, "move {}", turn);
    }
    let last = records.last().expect("moves played");

    let expected = [
        Square::Occupied(Mark::X),
        Square::Occupied(Mark::X),
        Square::Occupied(Mark::X),
        Square::Occupied(Mark::O),
        Square::Occupied(Mark::O),
        Square::Empty,
        Square::Empty,
        Square::Empty,
        Square::Empty,
    ];
    assert_eq!(last.board().squares(), &expected);
    assert_eq!(*last.status(), GameStatus::Completed);
    assert_eq!(last.outcome(), Outcome::Won(Mark::X));

    for coordinator in [&table.x, &table.o] {
        let outcome = coordinator.submit_move(5).await.expect("late move");
        assert_eq!(
            outcome,
            MoveOutcome::Ignored(MoveRejection::NotStarted(GameStatus::Completed))
        );
    }
    assert_eq!(
        table.o.view().expect("loaded").headline(table.o.user_id()),
        "Game over - winner: X"
    );
}

#[tokio::test]
async fn test_draw_completes_game() {
    let table = started_game().await;
    let records = play(&table, &[0, 1, 2, 4, 3, 5, 7, 6, 8]).await;
    let last = records.last().expect("moves played");

    assert_eq!(last.outcome(), Outcome::Draw);
    assert_eq!(*last.status(), GameStatus::Completed);
    assert!(last.violations().is_empty());
}

#[tokio::test]
async fn test_failed_write_keeps_optimistic_view_until_reload() {
    let table = started_game().await;
    table.store.set_available(false);

    let err = table.x.submit_move(0).await.expect_err("store is down");
    assert!(err.is_retryable());

    let optimistic = table.x.view().expect("loaded");
    assert!(*optimistic.pending());
    assert_eq!(optimistic.record().board().get(0), Some(Square::Occupied(Mark::X)));
    assert_eq!(*optimistic.record().turn_owner(), Mark::O);

    table.store.set_available(true);
    table.x.load_game().await.expect("reload");

    let reverted = table.x.view().expect("loaded");
    assert!(!*reverted.pending());
    assert!(reverted.record().board().is_blank());
    assert_eq!(*reverted.record().turn_owner(), Mark::X);
}

#[tokio::test]
async fn test_remote_record_replaces_optimistic_view() {
    let table = started_game().await;
    table.store.set_available(false);
    table.x.submit_move(0).await.expect_err("store is down");
    table.store.set_available(true);

    let authoritative = table.o.load_game().await.expect("load");
    assert!(table.x.on_remote_change(authoritative.clone()));
    assert_eq!(table.x.view(), Some(reconcile(authoritative)));
}

#[tokio::test]
async fn test_on_remote_change_is_idempotent() {
    let table = started_game().await;
    table.x.submit_move(0).await.expect("x moves");
    let record = table.o.load_game().await.expect("load");

    // o already holds this record from the load.
    assert!(!table.o.on_remote_change(record.clone()));
    assert!(!table.o.on_remote_change(record.clone()));
    assert_eq!(table.o.view(), Some(reconcile(record)));
}

#[tokio::test]
async fn test_record_for_other_game_is_ignored() {
    let table = started_game().await;
    let alice = Lobby::new(Arc::clone(&table.store), UserId::from("alice"));
    let other = alice.create_game().await.expect("create");

    let before = table.x.view();
    assert!(!table.x.on_remote_change(other));
    assert_eq!(table.x.view(), before);
}

#[tokio::test]
async fn test_subscription_delivers_opponent_moves() {
    let table = started_game().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = table
        .x
        .subscribe(move |record: &GameRecord| {
            let _ = tx.send(record.clone());
        })
        .await
        .expect("subscribe");

    table.x.submit_move(0).await.expect("x moves");
    let echoed = timeout(WAIT, rx.recv()).await.expect("echo").expect("open");
    assert_eq!(echoed.board().get(0), Some(Square::Occupied(Mark::X)));

    table.o.load_game().await.expect("reload o");
    table.o.submit_move(4).await.expect("o moves");
    let reply = timeout(WAIT, rx.recv()).await.expect("reply").expect("open");
    assert_eq!(*reply.turn_owner(), Mark::X);

    let mut views = table.x.watch();
    timeout(
        WAIT,
        views.wait_for(|view| {
            view.as_ref()
                .is_some_and(|view| view.record().board().get(4) == Some(Square::Occupied(Mark::O)))
        }),
    )
    .await
    .expect("view updated")
    .expect("sender alive");
    assert!(table.x.view().expect("loaded").record().can_move(table.x.user_id()));

    handle.cancel();
}

#[tokio::test]
async fn test_join_reaches_creators_game_list_subscription() {
    let store = Arc::new(MemoryStore::new());
    let alice = Lobby::new(Arc::clone(&store), UserId::from("alice"));
    let bob = Lobby::new(Arc::clone(&store), UserId::from("bob"));

    let game = alice.create_game().await.expect("create");
    let mut mine = alice.watch_my_games().await.expect("watch");
    assert_eq!(mine.user_id(), alice.user_id());

    let o = bob.open(game.id().clone()).await.expect("open as bob");
    assert!(matches!(o.join_game().await.expect("join"), JoinOutcome::Joined(_)));

    let changed = timeout(WAIT, mine.recv())
        .await
        .expect("no notification")
        .expect("feed closed");
    assert_eq!(changed.id(), game.id());
    assert_eq!(*changed.status(), GameStatus::Started);
    assert_eq!(changed.opponent_id().as_ref(), Some(bob.user_id()));

    let listed = alice.my_games().await.expect("list");
    assert_eq!(listed, vec![changed]);
}

#[tokio::test]
async fn test_cancel_is_idempotent_and_stops_delivery() {
    let table = started_game().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<GameRecord>();
    let handle = table
        .x
        .subscribe(move |record: &GameRecord| {
            let _ = tx.send(record.clone());
        })
        .await
        .expect("subscribe");

    handle.cancel();
    handle.cancel();
    assert!(handle.is_cancelled());

    // The aborted task drops the callback and with it the sender.
    let closed = timeout(WAIT, rx.recv()).await.expect("task dropped");
    assert!(closed.is_none());

    table.x.submit_move(0).await.expect("x moves");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_forced_illegal_record_is_adopted_verbatim() {
    let table = started_game().await;
    let current = table.x.view().expect("loaded").record().clone();

    let mut squares = *current.board().squares();
    squares[0] = Square::Occupied(Mark::O);
    squares[1] = Square::Occupied(Mark::O);
    let tampered = GameRecord::from_parts(
        current.id().clone(),
        tictactoe_sync::Board::from_squares(squares),
        Mark::X,
        GameStatus::Started,
        current.creator_id().clone(),
        current.opponent_id().clone(),
        *current.created_at(),
    );
    assert!(!tampered.violations().is_empty());

    table.store.force_write(tampered.clone()).await;
    table.x.load_game().await.expect("reload");
    assert_eq!(table.x.view().expect("loaded").record(), &tampered);
}
