use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use server::broadcast::OUTBOUND_BUFFER;
use server::connection::ConnectionEvent;
use server::server::Server;
use server::session::SessionRegistry;
use system::uuid::Uuid;
use system::{
    ClaimError, ClaimOutcome, ColorAllocator, GridDimensions, RejectReason, ServerMessage,
    SessionId, SessionInfo,
};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{channel, Receiver};

struct Client {
    info: SessionInfo,
    rx: Receiver<ConnectionEvent>,
}

impl Client {
    fn join(server: &Server) -> Self {
        Self::join_with_buffer(server, OUTBOUND_BUFFER)
    }

    fn join_with_buffer(server: &Server, buffer: usize) -> Self {
        let (tx, rx) = channel(buffer);
        let info = server.connect(tx);
        Self { info, rx }
    }

    fn id(&self) -> SessionId {
        self.info.user_id
    }

    fn events(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn messages(&mut self) -> Vec<ServerMessage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ConnectionEvent::Frame(frame) => Some(serde_json::from_str(&frame).expect("")),
                ConnectionEvent::Close => None,
            })
            .collect()
    }

    /// `true` once the server has dropped this session's sender, which the
    /// connection turns into a close.
    fn is_released(&mut self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn claim(&self, server: &Server, cell_id: i64) {
        server.handle_frame(
            &self.id(),
            &format!(r#"{{"type":"claim_cell","cellId":{}}}"#, cell_id),
        );
    }
}

fn canvas() -> Server {
    Server::new(GridDimensions::default())
}

#[test]
fn it_sends_init_state_and_count_to_others() {
    let server = canvas();
    let mut a = Client::join(&server);

    match a.messages().as_slice() {
        [ServerMessage::InitState {
            you,
            grid,
            connected_users,
        }] => {
            assert_eq!(you, &a.info);
            assert_eq!(grid.len(), 400);
            assert!(grid.iter().all(|c| c.owner_id.is_none()));
            assert_eq!(*connected_users, 1);
        }
        other => panic!("unexpected messages {:?}", other),
    }

    let mut b = Client::join(&server);
    match b.messages().as_slice() {
        [ServerMessage::InitState {
            connected_users, ..
        }] => assert_eq!(*connected_users, 2),
        other => panic!("unexpected messages {:?}", other),
    }
    assert_eq!(a.messages(), vec![ServerMessage::UsersCount { count: 2 }]);
}

#[test]
fn it_broadcasts_accepted_claim_and_rejects_the_late_claimant() {
    let server = canvas();
    let mut a = Client::join(&server);
    let mut b = Client::join(&server);
    let mut c = Client::join(&server);
    a.events();
    b.events();
    c.events();

    a.claim(&server, 7);
    let winner = a.info.clone();

    for client in [&mut a, &mut b, &mut c] {
        match client.messages().as_slice() {
            [ServerMessage::CellUpdated {
                cell_id,
                owner_id,
                color,
                ..
            }] => {
                assert_eq!(*cell_id, 7);
                assert_eq!(*owner_id, winner.user_id);
                assert_eq!(*color, winner.color);
            }
            other => panic!("unexpected messages {:?}", other),
        }
    }

    b.claim(&server, 7);

    assert_eq!(
        b.messages(),
        vec![ServerMessage::claim_rejected(7, RejectReason::AlreadyClaimed)]
    );
    assert!(a.messages().is_empty());
    assert!(c.messages().is_empty());
    assert_eq!(server.grid_snapshot()[7].owner_id, Some(a.id()));
}

#[test]
fn it_ignores_reclaiming_own_cell() {
    let server = canvas();
    let mut a = Client::join(&server);
    let mut b = Client::join(&server);
    a.claim(&server, 3);
    a.events();
    b.events();

    assert_eq!(server.claim(&a.id(), 3), Ok(ClaimOutcome::AlreadyOwned));
    a.claim(&server, 3);

    assert!(a.events().is_empty());
    assert!(b.events().is_empty());
}

#[test]
fn it_reports_out_of_range_cells_only_to_sender() {
    let server = canvas();
    let mut a = Client::join(&server);
    let mut b = Client::join(&server);
    a.events();
    b.events();

    a.claim(&server, -1);
    a.claim(&server, 400);

    assert_eq!(
        a.messages(),
        vec![
            ServerMessage::error("invalid cell id"),
            ServerMessage::error("invalid cell id"),
        ]
    );
    assert!(b.events().is_empty());
    assert_eq!(server.stats().claimed_cells, 0);
    assert_eq!(server.claim(&a.id(), 400), Err(ClaimError::InvalidCell(400)));
}

#[test]
fn it_rejects_claims_from_unknown_sessions() {
    let server = canvas();
    let mut a = Client::join(&server);
    a.events();
    let stranger = Uuid::new_v4();

    assert_eq!(
        server.claim(&stranger, 0),
        Err(ClaimError::UnknownSession(stranger))
    );
    assert!(a.events().is_empty());
    assert_eq!(server.stats().claimed_cells, 0);
}

#[test]
fn it_answers_ping_and_malformed_frames() {
    let server = canvas();
    let mut a = Client::join(&server);
    a.events();

    server.handle_frame(&a.id(), r#"{"type":"ping"}"#);
    server.handle_frame(&a.id(), r#"{"type":"join"}"#);
    server.handle_frame(&a.id(), "{oops");
    server.handle_frame(&a.id(), r#"{"type":"claim_cell","cellId":"seven"}"#);

    let messages = a.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0], ServerMessage::Pong);
    for message in &messages[1..] {
        match message {
            ServerMessage::Error { message } => assert!(message.starts_with("invalid message")),
            other => panic!("unexpected message {:?}", other),
        }
    }
}

#[test]
fn it_includes_every_prior_claim_in_init_state() {
    let server = canvas();
    let a = Client::join(&server);
    a.claim(&server, 1);
    a.claim(&server, 399);

    let mut late = Client::join(&server);

    match late.messages().as_slice() {
        [ServerMessage::InitState { grid, .. }] => {
            let owned = grid
                .iter()
                .filter(|c| c.owner_id == Some(a.id()))
                .map(|c| c.id)
                .collect::<Vec<_>>();
            assert_eq!(owned, vec![1, 399]);
            assert_eq!(grid[1].color, Some(a.info.color));
            assert!(grid[1].updated_at.is_some());
        }
        other => panic!("unexpected messages {:?}", other),
    }
}

#[test]
fn it_lets_exactly_one_of_two_racing_claims_win() {
    for cell in 0..100 {
        let server = Arc::new(canvas());
        let a = Client::join(&server);
        let b = Client::join(&server);
        let barrier = Arc::new(Barrier::new(2));

        let handles = [a.id(), b.id()]
            .into_iter()
            .map(|id| {
                let server = server.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    server.claim(&id, cell).expect("")
                })
            })
            .collect::<Vec<_>>();
        let outcomes = handles
            .into_iter()
            .map(|h| h.join().expect(""))
            .collect::<Vec<_>>();

        let accepted = outcomes
            .iter()
            .filter(|o| matches!(o, ClaimOutcome::Accepted(_)))
            .count();
        let rejected = outcomes
            .iter()
            .filter(|o| **o == ClaimOutcome::Rejected(RejectReason::AlreadyClaimed))
            .count();
        assert_eq!((accepted, rejected), (1, 1));
    }
}

#[test]
fn it_counts_concurrent_registrations_minus_unregistrations() {
    let server = Arc::new(canvas());
    let joins = (0..32)
        .map(|_| {
            let server = server.clone();
            thread::spawn(move || Client::join(&server))
        })
        .collect::<Vec<_>>();
    let clients = joins
        .into_iter()
        .map(|h| h.join().expect(""))
        .collect::<Vec<_>>();

    let leaves = clients
        .iter()
        .take(12)
        .map(|client| {
            let server = server.clone();
            let id = client.id();
            thread::spawn(move || server.disconnect(&id))
        })
        .collect::<Vec<_>>();
    for leave in leaves {
        assert!(leave.join().expect(""));
    }

    assert_eq!(server.live_count(), 20);
    assert_eq!(server.stats().active_users.len(), 20);
}

#[test]
fn it_disconnects_once_and_broadcasts_the_new_count() {
    let server = canvas();
    let mut a = Client::join(&server);
    let b = Client::join(&server);
    a.events();

    assert!(server.disconnect(&b.id()));
    assert!(!server.disconnect(&b.id()));

    assert_eq!(a.messages(), vec![ServerMessage::UsersCount { count: 1 }]);
    assert_eq!(server.live_count(), 1);
}

#[test]
fn it_evicts_silent_sessions_with_a_single_count_update() {
    let server = canvas();
    let mut quiet = Client::join(&server);
    let mut also_quiet = Client::join(&server);
    let mut fresh = Client::join(&server);
    quiet.events();
    also_quiet.events();
    fresh.events();
    let later = Instant::now() + Duration::from_secs(60);
    assert!(server.touch_at(&fresh.id(), later));

    let report = server.sweep(later + Duration::from_secs(1), Duration::from_secs(35));

    let mut evicted = report.evicted.clone();
    evicted.sort();
    let mut expected = vec![quiet.id(), also_quiet.id()];
    expected.sort();
    assert_eq!(evicted, expected);
    assert_eq!(report.live_count, 1);
    assert_eq!(fresh.messages(), vec![ServerMessage::UsersCount { count: 1 }]);
    assert!(matches!(quiet.events().as_slice(), [ConnectionEvent::Close]));
    assert!(matches!(also_quiet.events().as_slice(), [ConnectionEvent::Close]));
}

#[test]
fn it_keeps_sessions_that_keep_signalling() {
    let server = canvas();
    let mut a = Client::join(&server);
    let start = Instant::now();
    let timeout = Duration::from_secs(35);
    server.handle_frame(&a.id(), r#"{"type":"ping"}"#);
    a.events();

    assert!(server.touch_at(&a.id(), start + Duration::from_secs(30)));
    let report = server.sweep(start + Duration::from_secs(60), timeout);

    assert!(report.evicted.is_empty());
    assert_eq!(report.live_count, 1);
    assert!(a.events().is_empty());

    let report = server.sweep(start + Duration::from_secs(66), timeout);
    assert_eq!(report.evicted, vec![a.id()]);
}

#[test]
fn it_drops_closed_transports_from_count_and_evicts_them() {
    let server = canvas();
    let mut a = Client::join(&server);
    let gone = Client::join(&server);
    let gone_id = gone.id();
    drop(gone);
    a.events();

    assert_eq!(server.live_count(), 1);

    let report = server.sweep(Instant::now(), Duration::from_secs(35));
    assert_eq!(report.evicted, vec![gone_id]);
    assert_eq!(a.messages(), vec![ServerMessage::UsersCount { count: 1 }]);
}

#[test]
fn it_evicts_clients_that_stop_reading() {
    let server = canvas();
    let mut slow = Client::join_with_buffer(&server, 1);
    let mut fast = Client::join(&server);
    fast.claim(&server, 0);
    fast.events();

    let report = server.sweep(Instant::now(), Duration::from_secs(35));

    assert_eq!(report.evicted, vec![slow.id()]);
    assert_eq!(fast.messages(), vec![ServerMessage::UsersCount { count: 1 }]);
    // only the initial state ever fit into the slow queue
    assert_eq!(slow.messages().len(), 1);
    assert!(slow.is_released());
    assert!(!server.touch(&slow.id()));
}

#[test]
fn it_assigns_colors_from_the_registry_allocator() {
    let seeded = || {
        let colors = ColorAllocator::with_rng(StdRng::seed_from_u64(7), 10);
        Server::with_registry(GridDimensions::new(2, 2), SessionRegistry::with_colors(colors))
    };
    let (first, second) = (seeded(), seeded());

    let a = Client::join(&first);
    let b = Client::join(&first);
    let c = Client::join(&second);
    let d = Client::join(&second);

    assert_eq!(a.info.color, c.info.color);
    assert_eq!(b.info.color, d.info.color);
    assert_ne!(a.id(), c.id());
}
