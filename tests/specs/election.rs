//! Leader election across contexts sharing one bus.

use crate::prelude::*;

#[tokio::test]
async fn smallest_context_id_becomes_primary() {
    let bus = LocalBus::new();
    let elections = vec![
        participant("tab-c", &bus),
        participant("tab-a", &bus),
        participant("tab-b", &bus),
    ];

    let outcomes = elect_all(&elections).await;

    assert_eq!(outcomes[1], ElectionOutcome::Won);
    let primaries: Vec<_> = elections.iter().filter(|e| e.is_primary()).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].context_id(), &ContextId::new("tab-a"));
    assert!(elections[0].leader().is_none());
    assert!(elections[1].leader().is_some());

    // Followers learn who holds authority from the claim
    assert!(
        eventually(Duration::from_secs(1), || {
            elections[0].known_primary() == Some(ContextId::new("tab-a"))
                && elections[2].known_primary() == Some(ContextId::new("tab-a"))
        })
        .await
    );

    for election in &elections {
        election.shutdown().await;
    }
}

#[tokio::test]
async fn successor_takes_over_when_primary_leaves() {
    let bus = LocalBus::new();
    let elections = vec![
        participant("tab-a", &bus),
        participant("tab-b", &bus),
        participant("tab-c", &bus),
    ];
    elect_all(&elections).await;
    assert!(elections[0].is_primary());
    let old_token = elections[0].leader().unwrap();

    elections[0].shutdown().await;

    assert!(!old_token.is_current());
    assert!(eventually(Duration::from_secs(2), || elections[1].is_primary()).await);
    assert!(!elections[2].is_primary());

    elections[1].shutdown().await;
    elections[2].shutdown().await;
}

#[tokio::test]
async fn context_without_a_channel_assumes_primary() {
    let election = lone_participant("tab-solo");

    let outcome = election.start().await.unwrap();

    assert_eq!(outcome, ElectionOutcome::FailOpen);
    assert!(election.is_primary());
    assert!(election.leader().is_some());
}
