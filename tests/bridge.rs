//! Dispatch over the WebSocket command channel and connection registry

use std::sync::Arc;
use std::time::{Duration, Instant};

use helpdesk_bridge::connections::{
    CommandResult, ConnectionRegistry, Identity, ReconnectPolicy, RegisterOutcome, ServerFrame,
};
use helpdesk_bridge::dispatch::{
    CommandAllowlist, CommandDispatcher, DEFAULT_COMMAND_TIMEOUT, DispatchError, WsCommandChannel,
};

mod common;
use common::{FakeConnection, connect, registry, spawn_agent};

fn dispatcher_for(
    registry: &helpdesk_bridge::connections::SharedConnectionRegistry,
    timeout: Duration,
) -> (Arc<WsCommandChannel>, Arc<CommandDispatcher>) {
    let channel = Arc::new(WsCommandChannel::new(Arc::clone(registry)));
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(registry),
        channel.clone(),
        CommandAllowlist::default(),
        timeout,
    ));
    (channel, dispatcher)
}

/// Wait until the pending table drains, failing after a second
async fn wait_for_empty(dispatcher: &CommandDispatcher) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while !dispatcher.pending().is_empty() {
        assert!(Instant::now() < deadline, "pending table never drained");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn test_whoami_round_trip() {
    let registry = registry();
    let (channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);
    spawn_agent(&registry, channel, "user1", |req| {
        (req.command == "whoami").then(|| CommandResult::output(req.correlation_id.clone(), "user1"))
    })
    .await;

    let output = dispatcher
        .run(&Identity::desktop_agent("user1"), "whoami")
        .await
        .unwrap();

    assert_eq!(output, "user1");
    assert!(dispatcher.pending().is_empty());
}

#[tokio::test]
async fn test_remote_error_is_reported() {
    let registry = registry();
    let (channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);
    spawn_agent(&registry, channel, "user1", |req| {
        Some(CommandResult::error(req.correlation_id.clone(), "access denied"))
    })
    .await;

    let err = dispatcher
        .run(&Identity::desktop_agent("user1"), "ipconfig")
        .await
        .unwrap_err();

    assert_eq!(err, DispatchError::RemoteError("access denied".to_string()));
}

#[tokio::test]
async fn test_timeout_then_late_result_is_dropped() {
    let registry = registry();
    let (channel, dispatcher) = dispatcher_for(&registry, Duration::from_millis(50));
    let FakeConnection { mut frames, .. } = connect(&registry, Identity::desktop_agent("user1")).await;

    let started = Instant::now();
    let err = dispatcher
        .run(&Identity::desktop_agent("user1"), "systeminfo")
        .await
        .unwrap_err();

    assert_eq!(err, DispatchError::Timeout(Duration::from_millis(50)));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(dispatcher.pending().is_empty());

    // The agent answers after the deadline; nothing is waiting for it
    let Some(ServerFrame::ExecuteCommand(request)) = frames.recv().await else {
        panic!("expected an execute_command frame");
    };
    channel.deliver(&CommandResult::output(request.correlation_id, "OS Name: Windows"));
    assert!(dispatcher.pending().is_empty());
}

#[tokio::test]
async fn test_rejected_command_never_reaches_the_device() {
    let registry = registry();
    let (_channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);
    let FakeConnection { mut frames, .. } = connect(&registry, Identity::desktop_agent("user1")).await;

    for command in ["format c:", "whoami /all", "WHOAMI", " whoami"] {
        let err = dispatcher
            .run(&Identity::desktop_agent("user1"), command)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::NotAllowlisted(command.to_string()));
    }

    assert!(frames.try_recv().is_err());
    assert!(dispatcher.pending().is_empty());
}

#[tokio::test]
async fn test_offline_target_fails_fast() {
    let registry = registry();
    let (_channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);

    let started = Instant::now();
    let err = dispatcher
        .run(&Identity::desktop_agent("nobody"), "whoami")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DispatchError::NotConnected(Identity::desktop_agent("nobody"))
    );
    assert!(started.elapsed() < Duration::from_millis(50));
    assert!(dispatcher.pending().is_empty());
}

#[tokio::test]
async fn test_requester_identity_is_not_a_device() {
    let registry = registry();
    let (_channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);
    let _requester = connect(&registry, Identity::requester("user1")).await;

    let err = dispatcher
        .run(&Identity::desktop_agent("user1"), "whoami")
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::NotConnected(_)));
}

#[tokio::test]
async fn test_concurrent_dispatches_resolve_independently() {
    let registry = registry();
    let (channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);
    let FakeConnection { mut frames, .. } = connect(&registry, Identity::desktop_agent("user1")).await;

    let run = |command: &'static str| {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run(&Identity::desktop_agent("user1"), command).await })
    };
    let hostname = run("hostname");
    let whoami = run("whoami");

    let mut requests = Vec::new();
    while requests.len() < 2 {
        if let Some(ServerFrame::ExecuteCommand(request)) = frames.recv().await {
            requests.push(request);
        }
    }
    assert_ne!(requests[0].correlation_id, requests[1].correlation_id);
    assert_eq!(dispatcher.in_flight_for(&Identity::desktop_agent("user1")), 2);

    // Answer in reverse order
    for request in requests.iter().rev() {
        let output = format!("{} output", request.command);
        channel.deliver(&CommandResult::output(request.correlation_id.clone(), output));
    }

    assert_eq!(hostname.await.unwrap().unwrap(), "hostname output");
    assert_eq!(whoami.await.unwrap().unwrap(), "whoami output");
    assert!(dispatcher.pending().is_empty());
}

#[tokio::test]
async fn test_result_racing_the_deadline_settles_once() {
    let registry = registry();
    let (channel, dispatcher) = dispatcher_for(&registry, Duration::from_millis(5));
    let FakeConnection { mut frames, .. } = connect(&registry, Identity::desktop_agent("user1")).await;

    // Answer each command somewhere around its deadline
    let responder = tokio::spawn(async move {
        let mut n = 0u64;
        while let Some(frame) = frames.recv().await {
            if let ServerFrame::ExecuteCommand(request) = frame {
                let channel = Arc::clone(&channel);
                let delay = Duration::from_millis(3 + n % 5);
                n += 1;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    channel.deliver(&CommandResult::output(request.correlation_id, "ok"));
                });
            }
        }
    });

    let tasks: Vec<_> = (0..200)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(&Identity::desktop_agent("user1"), "hostname").await })
        })
        .collect();

    for task in tasks {
        match task.await.unwrap() {
            Ok(output) => assert_eq!(output, "ok"),
            Err(DispatchError::Timeout(_)) => {}
            Err(other) => panic!("unexpected outcome: {other:?}"),
        }
    }

    wait_for_empty(&dispatcher).await;
    responder.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claimed_result_is_never_reported_as_timeout() {
    let registry = registry();
    let (_channel, dispatcher) = dispatcher_for(&registry, Duration::from_millis(2));
    let FakeConnection { mut frames, .. } = connect(&registry, Identity::desktop_agent("user1")).await;

    let mut claimed = 0;
    for n in 0..300u64 {
        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.run(&Identity::desktop_agent("user1"), "whoami").await })
        };
        let Some(ServerFrame::ExecuteCommand(request)) = frames.recv().await else {
            panic!("expected execute_command frame");
        };

        // Land the result on either side of the deadline
        let started = Instant::now();
        let delay = Duration::from_micros(1_500 + (n % 8) * 250);
        while started.elapsed() < delay {
            tokio::task::yield_now().await;
        }
        let won = dispatcher
            .pending()
            .resolve(CommandResult::output(request.correlation_id, "user1"));

        let outcome = task.await.unwrap();
        if won {
            claimed += 1;
            assert_eq!(outcome, Ok("user1".to_string()), "result claimed the call but was lost");
        } else {
            assert_eq!(outcome, Err(DispatchError::Timeout(Duration::from_millis(2))));
        }
    }

    assert!(claimed > 0);
    assert!(dispatcher.pending().is_empty());
}

#[tokio::test]
async fn test_replacement_keeps_commands_sent_to_new_connection() {
    let registry = registry();
    let (channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);
    let identity = Identity::desktop_agent("user1");
    let mut first = connect(&registry, identity.clone()).await;

    let old_call = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run(&Identity::desktop_agent("user1"), "hostname").await })
    };
    assert!(matches!(first.frames.recv().await, Some(ServerFrame::ExecuteCommand(_))));

    let mut second = connect(&registry, identity.clone()).await;
    let new_call = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run(&Identity::desktop_agent("user1"), "whoami").await })
    };
    let Some(ServerFrame::ExecuteCommand(request)) = second.frames.recv().await else {
        panic!("expected execute_command frame on the new connection");
    };

    // Teardown of the evicted socket runs after the newcomer took a command
    dispatcher.fail_connection(first.connection.id());
    dispatcher.connection_closed(first.connection.id()).await;

    assert_eq!(
        old_call.await.unwrap(),
        Err(DispatchError::Disconnected(identity.clone()))
    );
    assert_eq!(dispatcher.in_flight_for(&identity), 1);

    channel.deliver(&CommandResult::output(request.correlation_id, "user1"));
    assert_eq!(new_call.await.unwrap(), Ok("user1".to_string()));
    assert!(registry.is_online(&identity).await);
}

#[tokio::test]
async fn test_disconnect_fails_in_flight_commands() {
    let registry = registry();
    let (_channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);
    let FakeConnection {
        connection,
        mut frames,
    } = connect(&registry, Identity::desktop_agent("user1")).await;

    let task = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run(&Identity::desktop_agent("user1"), "systeminfo").await })
    };
    assert!(matches!(frames.recv().await, Some(ServerFrame::ExecuteCommand(_))));

    dispatcher.connection_closed(connection.id()).await;

    let started = Instant::now();
    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err, DispatchError::Disconnected(Identity::desktop_agent("user1")));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(dispatcher.pending().is_empty());
    assert!(!registry.is_online(&Identity::desktop_agent("user1")).await);
}

#[tokio::test]
async fn test_cancelled_dispatch_releases_its_entry() {
    let registry = registry();
    let (_channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);
    let FakeConnection { mut frames, .. } = connect(&registry, Identity::desktop_agent("user1")).await;

    let task = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run(&Identity::desktop_agent("user1"), "ipconfig").await })
    };
    assert!(matches!(frames.recv().await, Some(ServerFrame::ExecuteCommand(_))));
    assert_eq!(dispatcher.pending().len(), 1);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    wait_for_empty(&dispatcher).await;
}

#[tokio::test]
async fn test_reconnect_replaces_previous_connection() {
    let registry = registry();
    let (_channel, dispatcher) = dispatcher_for(&registry, DEFAULT_COMMAND_TIMEOUT);
    let identity = Identity::desktop_agent("user1");

    let first = connect(&registry, identity.clone()).await;
    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    let second = helpdesk_bridge::connections::Connection::new(identity.clone(), tx);

    let RegisterOutcome::Replaced(previous) = registry.register(second.clone()).await else {
        panic!("expected the first connection to be replaced");
    };
    assert_eq!(previous.id(), first.connection.id());

    // The old socket closing late must not evict the new one
    dispatcher.connection_closed(first.connection.id()).await;
    assert_eq!(registry.get(&identity).await.unwrap().id(), second.id());
}

#[tokio::test]
async fn test_reject_policy_keeps_existing_connection() {
    let registry = Arc::new(ConnectionRegistry::with_policy(ReconnectPolicy::Reject));
    let identity = Identity::desktop_agent("user1");

    let first = connect(&registry, identity.clone()).await;
    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    let outcome = registry
        .register(helpdesk_bridge::connections::Connection::new(identity.clone(), tx))
        .await;

    assert!(matches!(outcome, RegisterOutcome::Rejected));
    assert_eq!(registry.get(&identity).await.unwrap().id(), first.connection.id());
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_forced_close_wakes_the_owner() {
    let registry = registry();
    let first = connect(&registry, Identity::desktop_agent("user1")).await;

    let waiter = {
        let connection = first.connection.clone();
        tokio::spawn(async move { connection.closed().await })
    };
    first.connection.close();

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("close signal not delivered")
        .unwrap();
}
