// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::{ChannelSink, FakeStream};
use crate::transport::{CommandStream, Epoch, StreamEvent};
use async_trait::async_trait;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn fill(manager: &StreamManager, count: i64) {
    for n in 1..=count {
        manager.broadcast(format!("cmd-{n}").into_bytes());
    }
}

async fn next_event(stream: &mut FakeStream) -> StreamEvent {
    tokio::time::timeout(WAIT, stream.recv())
        .await
        .expect("timed out waiting for stream event")
        .unwrap()
        .expect("stream ended")
}

/// Next event after the session's `Started` header
async fn next(stream: &mut FakeStream) -> StreamEvent {
    loop {
        match next_event(stream).await {
            StreamEvent::Started { .. } => continue,
            event => return event,
        }
    }
}

/// A request resuming from `last` under `manager`'s current epoch
fn resume(manager: &StreamManager, last: Sequence) -> StreamRequest {
    StreamRequest::new("f1", last).with_epoch(Some(manager.epoch()))
}

async fn next_sequence(stream: &mut FakeStream) -> Sequence {
    match next(stream).await {
        StreamEvent::Command(c) => c.sequence,
        other => panic!("expected command, got {other:?}"),
    }
}

/// Sink that fails after accepting `remaining` sends
struct FailingSink {
    remaining: usize,
}

#[async_trait]
impl CommandSink for FailingSink {
    async fn send_started(&mut self, _: Epoch, _: Sequence) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_command(&mut self, _command: &ReplicatedCommand) -> Result<(), TransportError> {
        if self.remaining == 0 {
            return Err(TransportError::Closed);
        }
        self.remaining -= 1;
        Ok(())
    }

    async fn send_caught_up(&mut self, _: Sequence, _: bool) -> Result<(), TransportError> {
        Ok(())
    }

    async fn closed(&mut self) {
        std::future::pending::<()>().await
    }
}

#[tokio::test]
async fn catch_up_then_marker_then_live() {
    let manager = Arc::new(StreamManager::with_defaults());
    fill(&manager, 3);

    let (mut sink, mut stream) = ChannelSink::pair();
    let request = resume(&manager, 1);
    let session = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { serve_follower(&manager, &request, &mut sink, 8).await })
    };

    assert_eq!(
        next_event(&mut stream).await,
        StreamEvent::Started {
            epoch: manager.epoch(),
            from: 1
        }
    );
    assert_eq!(next_sequence(&mut stream).await, 2);
    assert_eq!(next_sequence(&mut stream).await, 3);
    assert_eq!(
        next(&mut stream).await,
        StreamEvent::CaughtUp {
            through: 3,
            gap: false
        }
    );

    manager.broadcast(b"live".to_vec());
    match next(&mut stream).await {
        StreamEvent::Command(c) => {
            assert_eq!(c.sequence, 4);
            assert_eq!(c.payload, b"live");
        }
        other => panic!("expected command, got {other:?}"),
    }

    // Replacing the registration ends this session cleanly
    let replacement = manager.subscribe("f1", 1);
    let summary = tokio::time::timeout(WAIT, session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        summary,
        SessionSummary {
            follower_id: "f1".into(),
            caught_up: 2,
            delivered: 1,
            gap: false,
            through: 4,
        }
    );
    assert_eq!(manager.follower_count(), 1);
    drop(replacement);
    assert_eq!(manager.follower_count(), 0);
}

#[tokio::test]
async fn current_follower_gets_only_marker() {
    let manager = Arc::new(StreamManager::with_defaults());
    fill(&manager, 2);

    let (mut sink, mut stream) = ChannelSink::pair();
    let request = resume(&manager, 2);
    let manager2 = Arc::clone(&manager);
    tokio::spawn(async move {
        let _ = serve_follower(&manager2, &request, &mut sink, 8).await;
    });

    assert_eq!(
        next(&mut stream).await,
        StreamEvent::CaughtUp {
            through: 2,
            gap: false
        }
    );
}

#[tokio::test]
async fn evicted_history_streams_live_with_gap() {
    let manager = Arc::new(StreamManager::new(3));
    fill(&manager, 10);

    let (mut sink, mut stream) = ChannelSink::pair();
    let request = resume(&manager, 2);
    let manager2 = Arc::clone(&manager);
    tokio::spawn(async move {
        let _ = serve_follower(&manager2, &request, &mut sink, 8).await;
    });

    assert_eq!(
        next(&mut stream).await,
        StreamEvent::CaughtUp {
            through: 2,
            gap: true
        }
    );
    manager.broadcast(b"after".to_vec());
    assert_eq!(next_sequence(&mut stream).await, 11);
}

#[tokio::test]
async fn fresh_follower_after_eviction_is_flagged() {
    let manager = Arc::new(StreamManager::new(3));
    fill(&manager, 10);

    let (mut sink, mut stream) = ChannelSink::pair();
    let manager2 = Arc::clone(&manager);
    tokio::spawn(async move {
        let _ = serve_follower(&manager2, &StreamRequest::new("f1", 0), &mut sink, 8).await;
    });

    // Whole buffer is sent, but it does not start at sequence 1
    for expected in 8..=10 {
        assert_eq!(next_sequence(&mut stream).await, expected);
    }
    assert_eq!(
        next(&mut stream).await,
        StreamEvent::CaughtUp {
            through: 10,
            gap: true
        }
    );
}

#[tokio::test]
async fn follower_ahead_of_leader_resumes_at_leader_position() {
    let manager = Arc::new(StreamManager::with_defaults());
    fill(&manager, 2);

    let (mut sink, mut stream) = ChannelSink::pair();
    let request = resume(&manager, 40);
    let manager2 = Arc::clone(&manager);
    tokio::spawn(async move {
        let _ = serve_follower(&manager2, &request, &mut sink, 8).await;
    });

    assert_eq!(
        next(&mut stream).await,
        StreamEvent::CaughtUp {
            through: 2,
            gap: true
        }
    );
    manager.broadcast(b"next".to_vec());
    assert_eq!(next_sequence(&mut stream).await, 3);
}

#[tokio::test]
async fn sink_failure_ends_session_and_unregisters() {
    let manager = Arc::new(StreamManager::with_defaults());
    fill(&manager, 5);

    let mut sink = FailingSink { remaining: 2 };
    let result = serve_follower(&manager, &StreamRequest::new("f1", 0), &mut sink, 8).await;

    assert!(matches!(result, Err(TransportError::Closed)));
    assert_eq!(manager.follower_count(), 0);
}

#[tokio::test]
async fn follower_hangup_ends_session_without_a_write() {
    let manager = Arc::new(StreamManager::with_defaults());
    let (mut sink, mut stream) = ChannelSink::pair();
    let session = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            serve_follower(&manager, &StreamRequest::new("f1", 0), &mut sink, 8).await
        })
    };

    assert_eq!(
        next(&mut stream).await,
        StreamEvent::CaughtUp {
            through: 0,
            gap: false
        }
    );
    assert_eq!(manager.followers(), vec!["f1"]);

    // No broadcast follows: the hangup alone has to end the session
    drop(stream);
    let summary = tokio::time::timeout(WAIT, session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summary.delivered, 0);
    assert_eq!(manager.follower_count(), 0);
    assert!(manager.followers().is_empty());
}

#[tokio::test]
async fn position_from_another_epoch_replays_retained_history() {
    // Old leader had assigned up to 1; this one reuses 1 and 2
    let manager = Arc::new(StreamManager::with_defaults());
    fill(&manager, 2);

    let (mut sink, mut stream) = ChannelSink::pair();
    let request = StreamRequest::new("f1", 1).with_epoch(Some(manager.epoch().wrapping_add(1)));
    let manager2 = Arc::clone(&manager);
    tokio::spawn(async move {
        let _ = serve_follower(&manager2, &request, &mut sink, 8).await;
    });

    assert_eq!(
        next_event(&mut stream).await,
        StreamEvent::Started {
            epoch: manager.epoch(),
            from: 0
        }
    );
    assert_eq!(next_sequence(&mut stream).await, 1);
    assert_eq!(next_sequence(&mut stream).await, 2);
    assert_eq!(
        next(&mut stream).await,
        StreamEvent::CaughtUp {
            through: 2,
            gap: false
        }
    );
}

#[tokio::test]
async fn position_without_epoch_is_not_trusted() {
    let manager = Arc::new(StreamManager::new(2));
    fill(&manager, 4);

    let (mut sink, mut stream) = ChannelSink::pair();
    let manager2 = Arc::clone(&manager);
    tokio::spawn(async move {
        let _ = serve_follower(&manager2, &StreamRequest::new("f1", 3), &mut sink, 8).await;
    });

    // Replays what is retained and flags the history it could not cover
    assert_eq!(next_sequence(&mut stream).await, 3);
    assert_eq!(next_sequence(&mut stream).await, 4);
    assert_eq!(
        next(&mut stream).await,
        StreamEvent::CaughtUp {
            through: 4,
            gap: true
        }
    );
}

#[tokio::test]
async fn broadcast_during_catch_up_is_delivered_once() {
    let manager = Arc::new(StreamManager::with_defaults());
    fill(&manager, 50);

    let (mut sink, mut stream) = ChannelSink::pair();
    {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let _ = serve_follower(&manager, &StreamRequest::new("f1", 0), &mut sink, 256).await;
        });
    }
    let writer = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            for n in 0..50 {
                manager.broadcast(format!("concurrent-{n}").into_bytes());
                tokio::task::yield_now().await;
            }
        })
    };
    writer.await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 100 {
        if let StreamEvent::Command(c) = next(&mut stream).await {
            seen.push(c.sequence);
        }
    }
    assert_eq!(seen, (1..=100).collect::<Vec<_>>());
}
