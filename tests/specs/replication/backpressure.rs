//! Backpressure specs
//!
//! Slow or full follower channels never hold up a leader write.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn stalled_follower_loses_live_deliveries_without_slowing_others() {
    let cluster = Cluster::new();
    let mut config = cluster.leader_config();
    // Room for every write below, so only the stalled channel can fill
    config.channel_capacity = 1024;
    let leader = start(&config).await;
    let follower = cluster.follower("f1", &leader).await;
    eventually("follower to go live", || {
        link(&follower).state == LinkState::Live
    })
    .await;

    // Registered with a one-slot channel that is never drained
    let manager = leader.node().store().stream().unwrap();
    let _stalled = manager.subscribe("stalled", 1);

    let kv = client(&leader);
    assert_eq!(kv.status().await.followers, strings(&["f1", "stalled"]));
    let writes = async {
        for i in 0..200 {
            assert_eq!(kv.set(&format!("k{i:03}"), "v").await, Response::Ok);
        }
    };
    tokio::time::timeout(Duration::from_secs(20), writes)
        .await
        .unwrap();

    let status = kv.status().await;
    assert_eq!(status.sequence, Some(200));
    assert_eq!(status.keys, 200);
    // The first write fills the slot; every later one is dropped
    assert_eq!(status.dropped_deliveries, 199);

    applied(&follower, 200).await;
    assert_eq!(local_keys(&follower).len(), 200);
    assert!(!link(&follower).gap);

    follower.stop().await.unwrap();
    leader.stop().await.unwrap();
}

#[tokio::test]
async fn stopped_follower_is_unregistered() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;
    let follower = cluster.follower("f1", &leader).await;
    eventually("follower to go live", || {
        link(&follower).state == LinkState::Live
    })
    .await;
    assert_eq!(client(&leader).status().await.followers, strings(&["f1"]));

    // No writes follow: the hangup alone removes the registration
    follower.stop().await.unwrap();

    let mut followers = client(&leader).status().await.followers;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !followers.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
        followers = client(&leader).status().await.followers;
    }
    assert_eq!(followers, Vec::<String>::new());
    assert_eq!(client(&leader).status().await.sequence, Some(0));
    leader.stop().await.unwrap();
}
