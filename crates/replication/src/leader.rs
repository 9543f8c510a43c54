// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader side of a follower stream: catch-up, then live relay

use crate::recent_log::CatchUp;
use crate::stream_manager::{StreamManager, Subscription};
use crate::transport::{CommandSink, StreamRequest, TransportError};
use kvr_core::{ReplicatedCommand, Sequence};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one follower session delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub follower_id: String,
    /// Commands sent from the recent log before going live
    pub caught_up: usize,
    /// Commands relayed from the live feed
    pub delivered: usize,
    /// Catch-up could not cover everything the follower asked for
    pub gap: bool,
    /// Highest sequence sent to the follower
    pub through: Sequence,
}

/// Stream catch-up and then live commands to one follower until its
/// registration is replaced, the follower hangs up, or the sink fails.
///
/// The follower is subscribed before the recent log is read, so a
/// command broadcast during catch-up reaches it either way; the relay
/// drops anything catch-up already sent.
pub async fn serve_follower<S>(
    manager: &Arc<StreamManager>,
    request: &StreamRequest,
    sink: &mut S,
    channel_capacity: usize,
) -> Result<SessionSummary, TransportError>
where
    S: CommandSink + ?Sized,
{
    let follower_id = request.follower_id.as_str();
    let subscription = manager.subscribe(follower_id, channel_capacity);
    info!(
        follower_id,
        last_sequence = request.last_sequence,
        "follower stream opened"
    );

    let result = relay(manager, request, sink, subscription).await;
    match &result {
        Ok(summary) => info!(
            follower_id,
            caught_up = summary.caught_up,
            delivered = summary.delivered,
            through = summary.through,
            "follower stream ended"
        ),
        Err(e) => warn!(follower_id, error = %e, "follower stream failed"),
    }
    result
}

async fn relay<S>(
    manager: &StreamManager,
    request: &StreamRequest,
    sink: &mut S,
    mut subscription: Subscription,
) -> Result<SessionSummary, TransportError>
where
    S: CommandSink + ?Sized,
{
    let follower_id = request.follower_id.as_str();
    let (backlog, gap, mut through) = plan_catch_up(manager, request);

    let mut summary = SessionSummary {
        follower_id: follower_id.to_string(),
        caught_up: 0,
        delivered: 0,
        gap,
        through,
    };

    sink.send_started(manager.epoch(), through).await?;
    for command in &backlog {
        sink.send_command(command).await?;
        through = command.sequence;
        summary.caught_up += 1;
    }
    sink.send_caught_up(through, gap).await?;
    debug!(follower_id, through, count = summary.caught_up, "catch-up sent");

    loop {
        let command = tokio::select! {
            command = subscription.recv() => command,
            _ = sink.closed() => {
                info!(follower_id, "follower hung up");
                break;
            }
        };
        let Some(command) = command else {
            break;
        };
        if command.sequence <= through {
            continue;
        }
        sink.send_command(&command).await?;
        through = command.sequence;
        summary.delivered += 1;
        debug!(follower_id, sequence = through, "relayed to follower");
    }

    summary.through = through;
    Ok(summary)
}

/// Commands to replay, whether history is missing, and the sequence the
/// follower is considered current through before any are sent
fn plan_catch_up(
    manager: &StreamManager,
    request: &StreamRequest,
) -> (Vec<ReplicatedCommand>, bool, Sequence) {
    let follower_id = request.follower_id.as_str();
    let mut last = request.last_sequence;
    if last > 0 && request.epoch != Some(manager.epoch()) {
        // Position was assigned by another leader incarnation
        warn!(
            follower_id,
            last_sequence = last,
            follower_epoch = ?request.epoch,
            epoch = manager.epoch(),
            "follower position is from another leader epoch, replaying retained history"
        );
        last = 0;
    }

    let latest = manager.latest_sequence();
    if last > latest {
        warn!(
            follower_id,
            last_sequence = last,
            latest,
            "follower is ahead of leader sequence, resuming from leader position"
        );
        return (Vec::new(), true, latest);
    }

    match manager.missed_commands(last) {
        CatchUp::Ready(commands) => {
            let gap = commands.first().is_some_and(|c| c.sequence > last + 1);
            if gap {
                warn!(
                    follower_id,
                    last_sequence = last,
                    oldest = ?commands.first().map(|c| c.sequence),
                    "catch-up starts after evicted history, follower needs out-of-band resync"
                );
            }
            (commands, gap, last)
        }
        CatchUp::Evicted { oldest } => {
            warn!(
                follower_id,
                last_sequence = last,
                oldest,
                "requested history evicted, follower needs out-of-band resync"
            );
            (Vec::new(), true, last)
        }
    }
}

#[cfg(test)]
#[path = "leader_tests.rs"]
mod tests;
