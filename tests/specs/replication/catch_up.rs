//! Catch-up specs
//!
//! A follower that joins late or reconnects replays what it missed
//! before any live command.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn late_follower_converges_on_leader_state() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;
    let kv = client(&leader);
    assert_eq!(kv.set("a", "1").await, Response::Ok);
    assert_eq!(kv.set("b", "2").await, Response::Ok);
    assert_eq!(kv.del("a").await, Response::Ok);

    let follower = cluster.follower("f1", &leader).await;
    applied(&follower, 3).await;

    let replica = client(&follower);
    assert_eq!(replica.keys().await, strings(&["b"]));
    assert_eq!(replica.get("b").await, value("2"));
    assert_eq!(replica.get("a").await, not_found("a"));
    assert_eq!(link(&follower).state, LinkState::Live);
    assert!(!link(&follower).gap);

    follower.stop().await.unwrap();
    leader.stop().await.unwrap();
}

#[tokio::test]
async fn live_writes_follow_catch_up_in_order() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;
    let kv = client(&leader);
    assert_eq!(kv.set("n", "0").await, Response::Ok);

    let follower = cluster.follower("f1", &leader).await;
    applied(&follower, 1).await;
    for i in 1..=30 {
        assert_eq!(kv.set("n", &i.to_string()).await, Response::Ok);
    }
    applied(&follower, 31).await;

    assert_eq!(client(&follower).get("n").await, value("30"));
    follower.stop().await.unwrap();
    leader.stop().await.unwrap();
}

#[tokio::test]
async fn restarted_follower_resumes_from_saved_sequence() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;
    let kv = client(&leader);
    kv.set("a", "1").await;
    kv.set("b", "2").await;

    let follower = cluster.follower("f1", &leader).await;
    applied(&follower, 2).await;
    follower.stop().await.unwrap();

    kv.del("a").await;
    kv.set("c", "3").await;

    let follower = cluster.follower("f1", &leader).await;
    applied(&follower, 4).await;
    assert_eq!(local_keys(&follower), strings(&["b", "c"]));

    follower.stop().await.unwrap();
    leader.stop().await.unwrap();
}

#[tokio::test]
async fn follower_rides_out_a_leader_outage() {
    let cluster = Cluster::new();
    let mut config = cluster.leader_config();
    let leader = start(&config).await;
    config.port = leader.addr().port();
    client(&leader).set("a", "1").await;

    let follower = cluster.follower("f1", &leader).await;
    applied(&follower, 1).await;

    leader.stop().await.unwrap();
    eventually("link to drop", || {
        link(&follower).state == LinkState::Disconnected
    })
    .await;

    // Sequences restart with the leader; the follower rewinds to match
    let leader = start(&config).await;
    eventually("follower to rejoin", || {
        let link = link(&follower);
        link.state == LinkState::Live && link.last_applied == 0
    })
    .await;
    client(&leader).set("b", "2").await;
    eventually("b to arrive", || local_keys(&follower).contains(&"b".to_string())).await;

    // The WAL kept "a" on both sides across the outage
    assert_eq!(local_keys(&follower), strings(&["a", "b"]));
    follower.stop().await.unwrap();
    leader.stop().await.unwrap();
}

#[tokio::test]
async fn evicted_history_is_flagged_as_a_gap() {
    let cluster = Cluster::new();
    let mut config = cluster.leader_config();
    config.recent_log_capacity = 2;
    let leader = start(&config).await;
    let kv = client(&leader);
    for key in ["a", "b", "c", "d", "e"] {
        kv.set(key, "x").await;
    }

    let follower = cluster.follower("f1", &leader).await;
    applied(&follower, 5).await;

    // Only the retained tail arrives; the follower keeps going with a known gap
    assert!(link(&follower).gap);
    assert_eq!(local_keys(&follower), strings(&["d", "e"]));

    kv.set("f", "x").await;
    applied(&follower, 6).await;
    assert_eq!(local_keys(&follower), strings(&["d", "e", "f"]));

    follower.stop().await.unwrap();
    leader.stop().await.unwrap();
}
