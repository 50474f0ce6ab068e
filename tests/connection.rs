mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use gxlink::{Command, ConnectOptions, ConnectionError, ConnectionState, Error, ProtocolConnection};

#[tokio::test]
async fn connect_reaches_connected_after_ok() {
    let (addr, _log) = spawn_printer().await;
    let printer = ProtocolConnection::new(addr, options());

    assert_eq!(printer.state(), ConnectionState::Disconnected);
    printer.connect().await.unwrap();
    assert_eq!(printer.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn connect_twice_is_rejected() {
    let (addr, _log) = spawn_printer().await;
    let printer = ProtocolConnection::new(addr, options());
    printer.connect().await.unwrap();

    assert_eq!(
        printer.connect().await,
        Err(Error::Connection(ConnectionError::AlreadyConnected))
    );
    assert_eq!(printer.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn concurrent_connect_is_rejected_without_disturbing_first() {
    let (listener, addr) = bind().await;
    let log: Log = Arc::default();
    let server_log = Arc::clone(&log);
    tokio::spawn(async move {
        let mut wire = Wire::accept(&listener).await;
        assert_eq!(wire.read_command().await.as_deref(), Some("M601 S1"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        wire.send(&canned_reply("M601 S1")).await;
        while let Some(cmd) = wire.read_command().await {
            server_log.lock().unwrap().push(Received::Text(cmd.clone()));
            wire.send(&canned_reply(&cmd)).await;
        }
    });

    let printer = ProtocolConnection::new(addr, options());
    let (first, second) = tokio::join!(printer.connect(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        printer.connect().await
    });

    assert_eq!(second, Err(Error::Connection(ConnectionError::AlreadyConnecting)));
    assert_eq!(first, Ok(()));
    assert_eq!(printer.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn replies_resolve_in_submission_order() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let mut wire = Wire::accept(&listener).await;
        wire.accept_session().await;

        let mut seen = Vec::new();
        for n in 0..5 {
            let cmd = wire.read_command().await.unwrap();
            // Nothing else may arrive while this one is unanswered
            let quiet = wire.quiet_for(Duration::from_millis(40)).await;
            seen.push((cmd, quiet));

            wire.send("CMD M900 Rec").await;
            tokio::time::sleep(Duration::from_millis(3)).await;
            wire.send(&format!("eived.\r\nP{}\r\no", n)).await;
            tokio::time::sleep(Duration::from_millis(3)).await;
            wire.send("k\r\n").await;
        }
        seen
    });

    let printer = ProtocolConnection::new(addr, options());
    printer.connect().await.unwrap();

    let replies: Vec<_> = (0..5)
        .map(|n| printer.enqueue(Command::Custom(format!("M900 P{}", n))))
        .collect();
    for (n, reply) in replies.into_iter().enumerate() {
        let lines = reply.wait().await.unwrap();
        assert_eq!(lines, vec!["CMD M900 Received.".to_string(), format!("P{}", n)]);
    }

    let seen = server.await.unwrap();
    for (n, (cmd, quiet)) in seen.into_iter().enumerate() {
        assert_eq!(cmd, format!("M900 P{}", n));
        assert!(quiet, "command {} overlapped the next send", n);
    }
}

#[tokio::test]
async fn close_mid_command_fails_in_flight_and_queued() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let mut wire = Wire::accept(&listener).await;
        wire.accept_session().await;
        let first = wire.read_command().await;
        let quiet = wire.quiet_for(Duration::from_millis(100)).await;
        (first, quiet)
        // wire dropped here: the printer hangs up
    });

    let printer = ProtocolConnection::new(addr, options());
    printer.connect().await.unwrap();

    let a = printer.enqueue(Command::GetInfo);
    let b = printer.enqueue(Command::GetStatus);
    let c = printer.enqueue(Command::GetTemperature);

    let (first, quiet) = server.await.unwrap();
    assert_eq!(first.as_deref(), Some("M115"));
    assert!(quiet, "queued commands were written");

    let a = a.wait().await.unwrap_err();
    let b = b.wait().await.unwrap_err();
    let c = c.wait().await.unwrap_err();
    assert!(matches!(a, Error::Connection(_)), "unexpected {:?}", a);
    assert_eq!(a, b);
    assert_eq!(b, c);

    wait_for(|| printer.state() == ConnectionState::Disconnected).await;
    assert_eq!(printer.send(Command::GetInfo).await.unwrap_err(), a);
}

#[tokio::test]
async fn abort_drains_queue_without_writing() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let mut wire = Wire::accept(&listener).await;
        wire.accept_session().await;
        let first = wire.read_command().await;
        let rest = wire.read_command().await;
        (first, rest)
    });

    let printer = ProtocolConnection::new(addr, options());
    printer.connect().await.unwrap();

    let replies: Vec<_> = (0..3).map(|_| printer.enqueue(Command::GetProgress)).collect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort().await;

    for reply in replies {
        assert_eq!(reply.wait().await, Err(Error::closed("closed by caller")));
    }
    let (first, rest) = server.await.unwrap();
    assert_eq!(first.as_deref(), Some("M27"));
    assert_eq!(rest, None);
    assert_eq!(printer.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn unmatched_ok_is_ignored() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let mut wire = Wire::accept(&listener).await;
        wire.accept_session().await;
        wire.send("ok\r\n").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        while let Some(cmd) = wire.read_command().await {
            wire.send(&canned_reply(&cmd)).await;
        }
    });

    let printer = ProtocolConnection::new(addr, options());
    printer.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let lines = printer.send(Command::GetProgress).await.unwrap();
    assert_eq!(lines, vec!["CMD M27 Received.", "SD printing byte 25/200"]);
}

#[tokio::test]
async fn send_before_connect_fails() {
    let printer = ProtocolConnection::new("127.0.0.1:1", options());
    assert_eq!(
        printer.send(Command::GetInfo).await,
        Err(Error::Connection(ConnectionError::NotConnected))
    );
}

#[tokio::test]
async fn retries_until_printer_answers() {
    let (listener, addr) = bind().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        // First connection is dropped straight away
        let (stream, _) = listener.accept().await.unwrap();
        counter.fetch_add(1, Ordering::SeqCst);
        drop(stream);

        let wire = Wire::accept(&listener).await;
        counter.fetch_add(1, Ordering::SeqCst);
        serve(wire, Arc::default()).await;
    });

    let printer = ProtocolConnection::new(
        addr,
        ConnectOptions {
            max_attempts: 3,
            ..options()
        },
    );
    printer.connect().await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(printer.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let (listener, addr) = bind().await;
    drop(listener);

    let printer = ProtocolConnection::new(
        addr,
        ConnectOptions {
            max_attempts: 3,
            retry_delay: Duration::from_millis(40),
            ..options()
        },
    );
    let started = Instant::now();
    let err = printer.connect().await.unwrap_err();

    assert!(matches!(err, Error::Connection(_)), "unexpected {:?}", err);
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(printer.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn silent_printer_times_out_session_start() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let mut wire = Wire::accept(&listener).await;
        let _ = wire.read_command().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let printer = ProtocolConnection::new(
        addr,
        ConnectOptions {
            connect_timeout: Duration::from_millis(100),
            ..options()
        },
    );
    assert_eq!(
        printer.connect().await,
        Err(Error::Connection(ConnectionError::TimedOut))
    );
    assert_eq!(printer.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn dropped_connect_returns_to_disconnected() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        // First client never gets its ok; the second is served normally
        let mut silent = Wire::accept(&listener).await;
        let _ = silent.read_command().await;
        let wire = Wire::accept(&listener).await;
        serve(wire, Arc::default()).await;
        drop(silent);
    });

    let printer = ProtocolConnection::new(addr, options());
    let outcome = tokio::time::timeout(Duration::from_millis(100), printer.connect()).await;
    assert!(outcome.is_err(), "connect finished against a silent printer");
    assert_eq!(printer.state(), ConnectionState::Disconnected);

    printer.connect().await.unwrap();
    assert_eq!(printer.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn idle_connection_is_closed() {
    let (addr, _log) = spawn_printer().await;
    let printer = ProtocolConnection::new(
        addr,
        ConnectOptions {
            idle_timeout: Duration::from_millis(100),
            ..options()
        },
    );
    printer.connect().await.unwrap();

    wait_for(|| printer.state() == ConnectionState::Disconnected).await;
    assert_eq!(
        printer.send(Command::GetInfo).await,
        Err(Error::Connection(ConnectionError::TimedOut))
    );
}

#[tokio::test]
async fn reconnect_after_disconnect() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        for _ in 0..2 {
            let wire = Wire::accept(&listener).await;
            serve(wire, Arc::default()).await;
        }
    });

    let printer = ProtocolConnection::new(addr, options());
    printer.connect().await.unwrap();
    printer.close().await.unwrap();
    assert_eq!(printer.state(), ConnectionState::Disconnected);

    printer.connect().await.unwrap();
    assert!(printer.send(Command::GetInfo).await.is_ok());
}

#[tokio::test]
async fn connections_get_distinct_ids() {
    let a = ProtocolConnection::new("127.0.0.1:8899", options());
    let b = ProtocolConnection::new("127.0.0.1:8899", options());
    assert_ne!(a.id(), b.id());
}
