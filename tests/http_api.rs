//! End-to-end tests: proposer and acceptors over real HTTP on localhost

use axum::Router;
use minicas::acceptor::http::{create_router as acceptor_router, AcceptorState};
use minicas::common::headers::BALLOT_HEADER;
use minicas::common::{Error, ProposerConfig};
use minicas::proposer::http::create_router as proposer_router;
use minicas::proposer::{AcceptorClient, Endpoint};
use minicas::protocol::{AcceptReply, Acceptor};
use minicas::{Ballot, MemoryAcceptor, ProposerClient, ProposerServer, State};
use std::sync::Arc;

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_acceptor(name: &str) -> (String, Arc<MemoryAcceptor>) {
    let store = Arc::new(MemoryAcceptor::new(name));
    let url = spawn(acceptor_router(AcceptorState {
        store: store.clone(),
        acceptor_id: name.to_string(),
    }))
    .await;
    (url, store)
}

/// Address nobody listens on
async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

struct Cluster {
    client: ProposerClient,
    stores: Vec<Arc<MemoryAcceptor>>,
    acceptors: Vec<String>,
}

async fn cluster(extra: Vec<String>) -> Cluster {
    let mut acceptors = Vec::new();
    let mut stores = Vec::new();
    for i in 0..3 {
        let (url, store) = spawn_acceptor(&format!("acc-{}", i)).await;
        acceptors.push(url);
        stores.push(store);
    }
    let mut members = acceptors.clone();
    members.extend(extra);

    let config = ProposerConfig {
        proposer_id: Some(1),
        preparers: members.clone(),
        accepters: members,
        ..Default::default()
    };
    let state = ProposerServer::new(config).build().unwrap();
    let url = spawn(proposer_router(state)).await;

    Cluster {
        client: ProposerClient::new(url),
        stores,
        acceptors,
    }
}

#[tokio::test]
async fn test_register_lifecycle_over_http() {
    let c = cluster(Vec::new()).await;

    let v1 = c.client.get("foo").await.unwrap();
    assert!(v1.value.is_empty());

    let v2 = c.client.cas("foo", b"", b"bar").await.unwrap();
    assert_eq!(v2.value, State::from_static(b"bar"));
    assert!(v2.ballot > v1.ballot);

    // Mismatched CAS: 200 with the unchanged value at a new ballot
    let v3 = c.client.cas("foo", b"wrong", b"baz").await.unwrap();
    assert_eq!(v3.value, State::from_static(b"bar"));
    assert!(v3.ballot > v2.ballot);

    // Mismatched delete: 412 without a ballot
    let err = c.client.delete("foo", b"stale").await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));
    assert_eq!(
        c.client.full_identity_read("foo").await.unwrap(),
        State::from_static(b"bar")
    );

    let v4 = c.client.delete("foo", b"bar").await.unwrap();
    assert!(v4.value.is_empty());

    let age = c
        .client
        .fast_forward_increment("foo", Ballot::new(100, 99))
        .await
        .unwrap();
    assert_eq!(age, Ballot::new(101, 1));

    let v5 = c.client.get("foo").await.unwrap();
    assert!(v5.value.is_empty());
    assert!(v5.ballot > age);
}

#[tokio::test]
async fn test_keys_with_reserved_characters() {
    let c = cluster(Vec::new()).await;
    let key = "users/42 profile?v=1";

    c.client.cas(key, b"", b"x").await.unwrap();
    assert_eq!(c.client.get(key).await.unwrap().value, State::from_static(b"x"));
    assert!(c.stores.iter().any(|s| s.register(key).is_some()));
}

#[tokio::test]
async fn test_conflict_is_412_with_ballot() {
    let c = cluster(Vec::new()).await;
    let rogue = Ballot::new(900, 5);
    for store in &c.stores {
        store.handle_prepare("foo", rogue);
    }

    let resp = reqwest::Client::new()
        .post(format!("{}/get/foo", c.client.base()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::PRECONDITION_FAILED);
    assert_eq!(resp.headers().get(BALLOT_HEADER).unwrap(), "900/5");

    // The proposer learned the ballot; the retry wins
    let v = c.client.get("foo").await.unwrap();
    assert!(v.ballot > rogue);

    for store in &c.stores {
        store.handle_prepare("foo", Ballot::new(5_000, 5));
    }
    let err = c.client.cas("foo", b"", b"bar").await.unwrap_err();
    assert_eq!(err.conflicting_ballot(), Some(Ballot::new(5_000, 5)));
}

#[tokio::test]
async fn test_minority_down_over_http() {
    let c = cluster(vec![dead_endpoint().await, dead_endpoint().await]).await;

    // 3 of 5 replicas are up
    let v = c.client.cas("foo", b"", b"bar").await.unwrap();
    assert_eq!(v.value, State::from_static(b"bar"));
    assert_eq!(
        c.client.full_identity_read("foo").await.unwrap(),
        State::from_static(b"bar")
    );
}

#[tokio::test]
async fn test_majority_down_is_500() {
    let c = cluster(Vec::new()).await;
    for url in &c.acceptors[1..] {
        c.client.remove_preparer(url).await.unwrap();
    }
    c.client.add_preparer(&dead_endpoint().await).await.unwrap();
    c.client.add_preparer(&dead_endpoint().await).await.unwrap();

    let err = c.client.get("foo").await.unwrap_err();
    match err {
        Error::Http(message) => assert!(message.starts_with("500"), "{}", message),
        other => panic!("expected HTTP 500, got {:?}", other),
    }
}

#[tokio::test]
async fn test_membership_over_http() {
    let c = cluster(Vec::new()).await;
    let members = c.client.members().await.unwrap();
    assert_eq!(members.proposer_id, 1);
    assert_eq!(members.preparers, c.acceptors);
    assert_eq!(members.accepters, c.acceptors);

    let (extra, _) = spawn_acceptor("acc-3").await;
    c.client.add_accepter(&format!("{}/", extra)).await.unwrap();
    // Same endpoint, different spelling: no duplicate
    c.client.add_accepter(&extra).await.unwrap();
    let members = c.client.members().await.unwrap();
    assert_eq!(members.accepters.len(), 4);
    assert!(members.accepters.contains(&extra));
    assert_eq!(members.preparers.len(), 3);

    c.client.cas("foo", b"", b"bar").await.unwrap();

    c.client.remove_accepter(&extra).await.unwrap();
    c.client.remove_preparer(&c.acceptors[0]).await.unwrap();
    let members = c.client.members().await.unwrap();
    assert_eq!(members.accepters, c.acceptors);
    assert_eq!(members.preparers, c.acceptors[1..].to_vec());
}

#[tokio::test]
async fn test_bad_requests() {
    let c = cluster(Vec::new()).await;

    for bad in ["", "not a url", "ftp://host:21", "http://h:1/?x=1"] {
        let err = c.client.add_preparer(bad).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)), "{:?}: {:?}", bad, err);
    }
    assert_eq!(c.client.members().await.unwrap().preparers.len(), 3);

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("{}/cas/foo", c.client.base()))
        .body("no separator")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = http
        .post(format!("{}/fast-forward-increment/foo", c.client.base()))
        .header(BALLOT_HEADER, "not-a-ballot")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_acceptor_client_wire() {
    let (url, store) = spawn_acceptor("acc-0").await;
    let client = AcceptorClient::new(Endpoint::parse(&url).unwrap(), reqwest::Client::new());
    assert_eq!(client.address(), url);

    let reply = client.prepare("k", Ballot::new(2, 1)).await.unwrap();
    assert_eq!(reply.ballot, Ballot::ZERO);
    assert!(!reply.found());

    let accepted = client
        .accept("k", Ballot::new(2, 1), State::from_static(b"v"))
        .await
        .unwrap();
    assert_eq!(accepted, AcceptReply::Accepted);
    assert_eq!(store.register("k").unwrap().value, Some(State::from_static(b"v")));

    // Empty value is found, distinct from never accepted
    client
        .accept("empty", Ballot::new(3, 1), State::new())
        .await
        .unwrap();
    let reply = client.prepare("empty", Ballot::new(4, 1)).await.unwrap();
    assert!(reply.found());
    assert_eq!(reply.state, Some(State::new()));

    let reply = client.prepare("k", Ballot::new(3, 1)).await.unwrap();
    assert_eq!(reply.ballot, Ballot::new(2, 1));
    assert_eq!(reply.state, Some(State::from_static(b"v")));

    let rejected = client
        .accept("k", Ballot::new(2, 9), State::from_static(b"w"))
        .await
        .unwrap();
    assert_eq!(rejected, AcceptReply::Rejected(Ballot::new(3, 1)));

    // Lower prepare is answered with the held ballot
    let reply = client.prepare("k", Ballot::new(1, 1)).await.unwrap();
    assert_eq!(reply.ballot, Ballot::new(3, 1));
}

#[tokio::test]
async fn test_health_and_metrics() {
    let c = cluster(Vec::new()).await;
    c.client.get("foo").await.unwrap();

    let http = reqwest::Client::new();
    let health: serde_json::Value = http
        .get(format!("{}/health", c.client.base()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["preparers"], 3);

    let metrics = http
        .get(format!("{}/metrics", c.client.base()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("minicas_rounds_started_total"));
}
