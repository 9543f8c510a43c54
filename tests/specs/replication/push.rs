//! Push replication specs
//!
//! A push-mode leader delivers each command to its followers before
//! acknowledging, but never fails a write because a follower is down.

use crate::prelude::*;
use similar_asserts::assert_eq;

async fn push_leader(cluster: &Cluster, followers: Vec<String>) -> RunningNode {
    let mut config = cluster.leader_config();
    config.mode = ReplicationMode::Push;
    config.followers = followers;
    config.replicate_timeout = Duration::from_millis(500);
    start(&config).await
}

#[tokio::test]
async fn pushed_writes_are_applied_before_the_ack() {
    let cluster = Cluster::new();
    let f1 = start(&cluster.push_follower_config("f1")).await;
    let f2 = start(&cluster.push_follower_config("f2")).await;
    let leader = push_leader(&cluster, vec![f1.addr().to_string(), f2.addr().to_string()]).await;
    let kv = client(&leader);

    assert_eq!(kv.set("a", "1").await, Response::Ok);
    assert_eq!(kv.set("b", "2").await, Response::Ok);
    assert_eq!(kv.del("a").await, Response::Ok);

    assert_eq!(local_keys(&f1), strings(&["b"]));
    assert_eq!(local_keys(&f2), strings(&["b"]));

    leader.stop().await.unwrap();
    f1.stop().await.unwrap();
    f2.stop().await.unwrap();
}

#[tokio::test]
async fn unreachable_follower_does_not_fail_the_write() {
    let cluster = Cluster::new();
    let gone = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let gone_addr = gone.local_addr().unwrap().to_string();
    drop(gone);

    let f1 = start(&cluster.push_follower_config("f1")).await;
    let leader = push_leader(&cluster, vec![gone_addr, f1.addr().to_string()]).await;

    assert_eq!(client(&leader).set("a", "1").await, Response::Ok);
    assert_eq!(client(&leader).get("a").await, value("1"));
    assert_eq!(local_keys(&f1), strings(&["a"]));

    leader.stop().await.unwrap();
    f1.stop().await.unwrap();
}

#[tokio::test]
async fn push_follower_refuses_a_stream() {
    let cluster = Cluster::new();
    let follower = start(&cluster.push_follower_config("f1")).await;

    let response = client(&follower)
        .send(Request::StreamReplication {
            follower_id: "f2".to_string(),
            last_sequence: 0,
            epoch: None,
        })
        .await;
    assert_eq!(response, Response::NotLeader { leader: None });

    follower.stop().await.unwrap();
}
