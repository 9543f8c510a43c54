//! Role specs
//!
//! Only the leader accepts writes; both roles serve reads.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn follower_refuses_writes_and_names_the_leader() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;
    let follower = cluster.follower("f1", &leader).await;
    let replica = client(&follower);

    let expected = Response::NotLeader {
        leader: Some(leader.addr().to_string()),
    };
    assert_eq!(replica.set("a", "1").await, expected);
    assert_eq!(replica.del("a").await, expected);
    assert!(local_keys(&follower).is_empty());

    follower.stop().await.unwrap();
    leader.stop().await.unwrap();
}

#[tokio::test]
async fn status_reports_each_side_of_the_link() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;
    let follower = cluster.follower("f1", &leader).await;
    client(&leader).set("a", "1").await;
    applied(&follower, 1).await;

    let status = client(&leader).status().await;
    assert_eq!(status.role, "leader");
    assert_eq!(status.sequence, Some(1));
    assert_eq!(status.followers, strings(&["f1"]));

    let status = client(&follower).status().await;
    assert_eq!(status.role, "follower");
    assert_eq!(status.link.as_deref(), Some("live"));
    assert_eq!(status.last_applied, Some(1));
    assert_eq!(status.keys, 1);

    follower.stop().await.unwrap();
    leader.stop().await.unwrap();
}

#[tokio::test]
async fn second_node_with_same_id_is_refused() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;

    let err = kvr_daemon::spawn(&cluster.leader_config()).await.err().unwrap();
    assert!(err.to_string().contains("already running"));

    // The first node is untouched
    assert_eq!(client(&leader).set("a", "1").await, Response::Ok);
    leader.stop().await.unwrap();
}
