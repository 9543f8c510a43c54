//! Store durability specs
//!
//! Acknowledged writes survive a restart; replay rebuilds the same view.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn acknowledged_writes_survive_restart() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;
    let kv = client(&leader);

    assert_eq!(kv.set("a", "1").await, Response::Ok);
    assert_eq!(kv.set("b", "2").await, Response::Ok);
    assert_eq!(kv.set("a", "3").await, Response::Ok);
    assert_eq!(kv.del("b").await, Response::Ok);
    leader.stop().await.unwrap();

    let leader = cluster.leader().await;
    let kv = client(&leader);
    assert_eq!(kv.get("a").await, value("3"));
    assert_eq!(kv.get("b").await, not_found("b"));
    assert_eq!(kv.keys().await, strings(&["a"]));
    leader.stop().await.unwrap();
}

#[tokio::test]
async fn replay_matches_live_view() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;
    let kv = client(&leader);

    for i in 0..50 {
        let key = format!("k{}", i % 7);
        if i % 5 == 4 {
            kv.del(&key).await;
        } else {
            assert_eq!(kv.set(&key, &i.to_string()).await, Response::Ok);
        }
    }
    let live: Vec<(String, Response)> = collect_view(&leader).await;
    leader.stop().await.unwrap();

    let leader = cluster.leader().await;
    assert_eq!(collect_view(&leader).await, live);
    leader.stop().await.unwrap();
}

async fn collect_view(node: &RunningNode) -> Vec<(String, Response)> {
    let kv = client(node);
    let mut view = Vec::new();
    for key in kv.keys().await {
        let value = kv.get(&key).await;
        view.push((key, value));
    }
    view
}

#[tokio::test]
async fn deleting_a_missing_key_is_not_found() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;

    assert_eq!(client(&leader).del("ghost").await, not_found("ghost"));
    assert_eq!(client(&leader).status().await.sequence, Some(0));
    leader.stop().await.unwrap();
}

#[tokio::test]
async fn values_keep_spaces_and_unicode() {
    let cluster = Cluster::new();
    let leader = cluster.leader().await;
    let kv = client(&leader);

    assert_eq!(kv.set("greeting", "héllo wörld  ").await, Response::Ok);
    assert_eq!(kv.set("empty", "").await, Response::Ok);
    leader.stop().await.unwrap();

    let leader = cluster.leader().await;
    assert_eq!(client(&leader).get("greeting").await, value("héllo wörld  "));
    assert_eq!(client(&leader).get("empty").await, value(""));
    leader.stop().await.unwrap();
}
