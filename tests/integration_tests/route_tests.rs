// HTTP surface through rocket's local client

use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::{Value, json};
use std::time::Duration;

use crate::test_utils::*;
use wallet_gate::build_rocket;
use wallet_gate::models::AppState;

const TOKEN: &str = "Bearer test_token";

async fn client_for(h: &Harness) -> Client {
    let state = AppState::assemble(&gate_config(), h.registry.clone(), h.pipeline.clone(), h.bus.clone());
    Client::tracked(build_rocket(state)).await.unwrap()
}

fn envelope(method: &str, params: Value) -> String {
    json!({
        "data": {"method": method, "params": params},
        "session": {"origin": ORIGIN, "name": "Example Dapp", "icon": ""}
    })
    .to_string()
}

/// Approve every prompt as it shows up until `count` have been answered.
async fn approve_prompts(client: &Client, count: usize, body: Value) {
    let mut answered = 0;
    for _ in 0..500 {
        let response = client
            .get("/approvals")
            .header(Header::new("Authorization", TOKEN))
            .dispatch()
            .await;
        let listed: Value = response.into_json().await.unwrap();
        if let Some(first) = listed["data"].as_array().and_then(|a| a.first()) {
            let id = first["id"].as_str().unwrap().to_string();
            let response = client
                .post(format!("/approvals/{id}"))
                .header(ContentType::JSON)
                .header(Header::new("Authorization", TOKEN))
                .body(body.to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::Ok);
            answered += 1;
            if answered == count {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("only {answered} of {count} prompts appeared");
}

#[tokio::test]
async fn test_index_summary() {
    let h = harness();
    h.add_local().await;
    let client = client_for(&h).await;

    let response = client.get("/").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["data"]["chain_id"], "0x1");
    assert_eq!(body["data"]["keyrings"], 1);
    assert!(
        body["data"]["methods"]
            .as_array()
            .unwrap()
            .contains(&json!("ethSendTransaction"))
    );
}

#[tokio::test]
async fn test_rpc_requires_token() {
    let h = harness();
    let client = client_for(&h).await;

    let missing = client
        .post("/rpc")
        .header(ContentType::JSON)
        .body(envelope("eth_chainId", json!([])))
        .dispatch()
        .await;
    assert_eq!(missing.status(), Status::Unauthorized);

    let wrong = client
        .post("/rpc")
        .header(ContentType::JSON)
        .header(Header::new("Authorization", "Bearer nope"))
        .body(envelope("eth_chainId", json!([])))
        .dispatch()
        .await;
    assert_eq!(wrong.status(), Status::Unauthorized);
}

#[tokio::test]
async fn test_rpc_waits_for_unlock_and_connect_approval() {
    let h = harness();
    h.add_local().await;
    let client = client_for(&h).await;

    let rpc = async {
        client
            .post("/rpc")
            .header(ContentType::JSON)
            .header(Header::new("Authorization", TOKEN))
            .body(envelope("eth_chainId", json!([])))
            .dispatch()
            .await
            .into_json::<Value>()
            .await
            .unwrap()
    };
    let approvals = approve_prompts(&client, 2, json!({"approved": true, "password": PASSWORD}));
    let (body, ()) = tokio::join!(rpc, approvals);

    assert_eq!(body["result"], "0x1");
    assert!(body.get("error").is_none());
    assert!(h.registry.is_unlocked());
}

#[tokio::test]
async fn test_rejected_prompt_maps_to_user_rejected() {
    let h = harness();
    h.registry.unlock(PASSWORD).unwrap();
    let client = client_for(&h).await;

    let rpc = async {
        client
            .post("/rpc")
            .header(ContentType::JSON)
            .header(Header::new("Authorization", TOKEN))
            .body(envelope("eth_accounts", json!([])))
            .dispatch()
            .await
            .into_json::<Value>()
            .await
            .unwrap()
    };
    let approvals = approve_prompts(&client, 1, json!({"approved": false, "reason": "not today"}));
    let (body, ()) = tokio::join!(rpc, approvals);

    assert_eq!(body["error"]["code"], 4001);
    assert_eq!(body["error"]["data"]["code"], "USER_REJECTED");
}

#[tokio::test]
async fn test_unknown_method_error_body() {
    let h = harness();
    h.registry.unlock(PASSWORD).unwrap();
    let client = client_for(&h).await;

    // connect first so the unknown method reaches dispatch
    let rpc = async {
        client
            .post("/rpc")
            .header(ContentType::JSON)
            .header(Header::new("Authorization", TOKEN))
            .body(envelope("eth_foo", json!(["bar"])))
            .dispatch()
            .await
            .into_json::<Value>()
            .await
            .unwrap()
    };
    let approvals = approve_prompts(&client, 1, json!({"approved": true}));
    let (body, ()) = tokio::join!(rpc, approvals);

    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["error"]["data"]["method"], "eth_foo");
    assert_eq!(body["error"]["data"]["request"]["params"][0], "bar");
}

#[tokio::test]
async fn test_unlock_approval_with_wrong_password_stays_pending() {
    let h = harness();
    h.add_local().await;
    let client = client_for(&h).await;

    let rpc = async {
        client
            .post("/rpc")
            .header(ContentType::JSON)
            .header(Header::new("Authorization", TOKEN))
            .body(envelope("eth_chainId", json!([])))
            .dispatch()
            .await
            .into_json::<Value>()
            .await
            .unwrap()
    };
    let attempt = async {
        // wait for the unlock prompt, answer it badly, then reject everything
        let mut id = None;
        for _ in 0..500 {
            let listed: Value = client
                .get("/approvals")
                .header(Header::new("Authorization", TOKEN))
                .dispatch()
                .await
                .into_json()
                .await
                .unwrap();
            if let Some(first) = listed["data"].as_array().and_then(|a| a.first()) {
                id = first["id"].as_str().map(str::to_string);
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let id = id.unwrap();
        let bad = client
            .post(format!("/approvals/{id}"))
            .header(ContentType::JSON)
            .header(Header::new("Authorization", TOKEN))
            .body(json!({"approved": true, "password": "wrong"}).to_string())
            .dispatch()
            .await;
        assert_eq!(bad.status(), Status::Unauthorized);

        let still: Value = client
            .get("/approvals")
            .header(Header::new("Authorization", TOKEN))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(still["data"].as_array().unwrap().len(), 1);

        let rejected = client
            .delete("/approvals")
            .header(Header::new("Authorization", TOKEN))
            .dispatch()
            .await;
        assert_eq!(rejected.status(), Status::Ok);
    };
    let (body, ()) = tokio::join!(rpc, attempt);
    assert_eq!(body["error"]["code"], 4001);
    assert!(!h.registry.is_unlocked());
}

#[tokio::test]
async fn test_keyring_management_routes() {
    let h = harness();
    let client = client_for(&h).await;

    let created = client
        .post("/keyrings/local")
        .header(ContentType::JSON)
        .header(Header::new("Authorization", TOKEN))
        .body(json!({"password": PASSWORD, "privateKeys": [KEY_1]}).to_string())
        .dispatch()
        .await;
    assert_eq!(created.status(), Status::Ok);
    let id = created.into_json::<Value>().await.unwrap()["data"]
        .as_str()
        .unwrap()
        .to_string();

    let accounts: Value = client
        .get("/accounts")
        .header(Header::new("Authorization", TOKEN))
        .dispatch()
        .await
        .into_json()
        .await
        .unwrap();
    let listed = accounts["data"][0]["address"].as_str().unwrap();
    assert!(listed.eq_ignore_ascii_case(&ADDRESS_1.to_string()));
    assert_eq!(accounts["data"][0]["keyringType"], "Local");

    let not_hardware = client
        .post(format!("/keyrings/{id}/retry"))
        .header(Header::new("Authorization", TOKEN))
        .dispatch()
        .await;
    assert_eq!(not_hardware.status(), Status::BadRequest);

    let removed = client
        .delete(format!("/keyrings/{id}"))
        .header(Header::new("Authorization", TOKEN))
        .dispatch()
        .await;
    assert_eq!(removed.status(), Status::Ok);
    assert_eq!(h.registry.keyring_count(), 0);
}

#[tokio::test]
async fn test_multisig_routes_without_staged_transaction() {
    let h = harness();
    h.add_local().await;
    h.add_multisig(vec![1]).await;
    let client = client_for(&h).await;

    let response = client
        .post(format!("/multisig/{SAFE}/exec"))
        .header(ContentType::JSON)
        .header(Header::new("Authorization", TOKEN))
        .body("{}")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);

    let bad_address = client
        .post("/multisig/0x1234/confirm")
        .header(ContentType::JSON)
        .header(Header::new("Authorization", TOKEN))
        .body("{}")
        .dispatch()
        .await;
    assert_eq!(bad_address.status(), Status::BadRequest);
}

#[tokio::test]
async fn test_lock_route() {
    let h = harness();
    h.add_local().await;
    h.registry.unlock(PASSWORD).unwrap();
    let client = client_for(&h).await;

    let response = client
        .post("/lock")
        .header(Header::new("Authorization", TOKEN))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert!(!h.registry.is_unlocked());
}
