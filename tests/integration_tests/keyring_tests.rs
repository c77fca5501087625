// Keyring registry with all three backend families

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256, keccak256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::SignerSync;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::test_utils::*;
use wallet_gate::WalletError;
use wallet_gate::models::{KeyringDescriptor, KeyringType, MultisigTransaction};
use wallet_gate::services::events::EventKind;
use wallet_gate::services::keyring::{DescriptorStore, KeyringRegistry, MemoryDescriptorStore, SignerBackend};

fn safe_tx() -> TransactionRequest {
    TransactionRequest::default()
        .with_to(RECIPIENT)
        .with_value(U256::from(5))
        .with_chain_id(1)
}

fn owner_signature(key: &str, tx: &MultisigTransaction) -> Bytes {
    let signature = signer(key).sign_hash_sync(&tx.hash).unwrap();
    Bytes::from(signature.as_bytes().to_vec())
}

async fn propose(h: &Harness) -> MultisigTransaction {
    let signed = h.registry.sign_transaction(SAFE, safe_tx()).await.unwrap();
    assert!(signed.raw.is_none());
    let backend = h.registry.resolve(SAFE).await.unwrap();
    let staged = backend.as_multisig().unwrap().staged_transaction().unwrap();
    assert_eq!(staged.hash, signed.hash);
    staged
}

#[tokio::test]
async fn test_multisig_proposal_carries_owner_signature() {
    let h = harness();
    h.add_local().await;
    h.add_multisig(vec![1]).await;

    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    h.bus.on(EventKind::TransactionBuilt, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let staged = propose(&h).await;
    assert_eq!(staged.threshold, 2);
    assert_eq!(staged.signatures.len(), 1);
    assert!(staged.signatures.contains_key(&ADDRESS_0));
    assert_eq!(staged.tx.nonce, U256::from(4));
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(h.federation.proposals.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_multisig_refuses_message_signing() {
    let h = harness();
    h.add_local().await;
    h.add_multisig(vec![1]).await;

    let err = h.registry.sign_message(SAFE, b"hello").await.unwrap_err();
    assert!(matches!(err, WalletError::MultisigUnsupported(_)));
}

#[tokio::test]
async fn test_confirmations_in_either_order_reach_threshold() {
    for remote_first in [true, false] {
        let h = harness();
        h.add_local().await;
        h.add_multisig(vec![1]).await;
        let proposal = propose(&h).await;
        let backend = h.registry.resolve(SAFE).await.unwrap();
        let coordinator = backend.as_multisig().unwrap();

        // an unsigned transaction proposed from another owner's session
        let mut bare = proposal.clone();
        bare.signatures.clear();
        bare.hash = keccak256(b"proposed elsewhere");

        let remote = owner_signature(KEY_1, &bare);
        let merged = if remote_first {
            coordinator.add_confirmation(&bare, ADDRESS_1, remote).unwrap();
            coordinator.confirm_transaction(Some(bare.clone())).await.unwrap()
        } else {
            coordinator.confirm_transaction(Some(bare.clone())).await.unwrap();
            coordinator.add_confirmation(&bare, ADDRESS_1, remote).unwrap()
        };
        assert_eq!(merged.signatures.len(), 2, "remote_first={remote_first}");
        assert!(merged.is_executable());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirmations_merge_once_per_owner() {
    let h = harness();
    h.add_local().await;
    h.add_multisig(vec![1]).await;
    let proposal = propose(&h).await;
    let backend = h.registry.resolve(SAFE).await.unwrap();

    let mut bare = proposal.clone();
    bare.signatures.clear();
    bare.hash = keccak256(b"confirmed concurrently");

    let confirmed = Arc::new(AtomicUsize::new(0));
    let counter = confirmed.clone();
    h.bus.on(EventKind::TransactionConfirmed, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let own = {
        let backend = backend.clone();
        let tx = bare.clone();
        tokio::spawn(async move {
            let coordinator = backend.as_multisig().unwrap();
            coordinator.confirm_transaction(Some(tx)).await.unwrap()
        })
    };
    let remote = |owner: Address, key: &'static str| {
        let backend = backend.clone();
        let tx = bare.clone();
        tokio::spawn(async move {
            let signature = owner_signature(key, &tx);
            backend
                .as_multisig()
                .unwrap()
                .add_confirmation(&tx, owner, signature)
                .unwrap()
        })
    };
    let (own, first, second, repeat) = tokio::join!(
        own,
        remote(ADDRESS_1, KEY_1),
        remote(ADDRESS_2, KEY_2),
        remote(ADDRESS_1, KEY_1)
    );
    let (own, first, second, repeat) = (own.unwrap(), first.unwrap(), second.unwrap(), repeat.unwrap());

    // merges are serialized, so the first two of the three distinct owners
    // see one and two signatures, whichever order they landed in
    let mut sizes: Vec<usize> = [&own, &first, &second, &repeat]
        .iter()
        .map(|snapshot| snapshot.signatures.len())
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes[0], 1);
    assert_eq!(sizes[3], 3);
    for snapshot in [&own, &first, &second, &repeat] {
        assert_eq!(snapshot.is_executable(), snapshot.signatures.len() >= 2);
    }

    let coordinator = backend.as_multisig().unwrap();
    let settled = coordinator
        .add_confirmation(&bare, ADDRESS_1, owner_signature(KEY_1, &bare))
        .unwrap();
    let owners: Vec<_> = settled.signatures.keys().copied().collect();
    let mut expected = vec![ADDRESS_0, ADDRESS_1, ADDRESS_2];
    expected.sort();
    assert_eq!(owners, expected);
    assert!(settled.is_executable());
    assert_eq!(confirmed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_duplicate_confirmation_is_noop() {
    let h = harness();
    h.add_local().await;
    h.add_multisig(vec![1]).await;
    let proposal = propose(&h).await;

    let confirmed = Arc::new(AtomicUsize::new(0));
    let counter = confirmed.clone();
    h.bus.on(EventKind::TransactionConfirmed, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let again = h.registry.confirm_multisig(SAFE, None).await.unwrap();
    assert_eq!(again.signatures.len(), 1);
    assert_eq!(again.signatures[&ADDRESS_0], proposal.signatures[&ADDRESS_0]);
    assert_eq!(confirmed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_exec_below_threshold_fails() {
    let h = harness();
    h.add_local().await;
    h.add_multisig(vec![1]).await;
    propose(&h).await;

    let err = h.registry.exec_multisig(SAFE, None).await.unwrap_err();
    assert!(matches!(
        err,
        WalletError::ThresholdNotMet {
            collected: 1,
            threshold: 2
        }
    ));
    assert!(h.federation.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_exec_merges_remote_confirmations() {
    let h = harness();
    h.add_local().await;
    h.add_multisig(vec![1]).await;
    let proposal = propose(&h).await;
    h.federation
        .push_confirmation(proposal.hash, ADDRESS_1, owner_signature(KEY_1, &proposal));

    let backend = h.registry.resolve(SAFE).await.unwrap();
    let fired = Arc::new(std::sync::Mutex::new(None));
    let slot = fired.clone();
    backend
        .as_multisig()
        .unwrap()
        .on_completion(move |hash| *slot.lock().unwrap() = Some(hash));

    let onchain = h.registry.exec_multisig(SAFE, None).await.unwrap();
    assert_eq!(onchain, keccak256(proposal.hash));
    assert_eq!(*fired.lock().unwrap(), Some(onchain));
    assert!(backend.as_multisig().unwrap().staged_transaction().is_none());

    // nothing left to act on
    let err = h.registry.confirm_multisig(SAFE, None).await.unwrap_err();
    assert!(matches!(err, WalletError::NoAvailableTransaction));
}

#[tokio::test]
async fn test_safe_without_network_mapping_is_hidden() {
    let h = harness();
    h.add_local().await;
    h.add_multisig(vec![]).await;

    let accounts = h.registry.get_accounts().await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].address, ADDRESS_0);
    assert!(matches!(
        h.registry.resolve(SAFE).await,
        Err(WalletError::AccountNotFound(_))
    ));
}

#[tokio::test]
async fn test_hardware_init_is_bounded() {
    let h = harness_with(HarnessOptions {
        hardware: fast_hardware_config(3),
        failing_opens: 100,
        ..Default::default()
    });
    let id = h.add_hardware().await;

    let err = h.registry.retry_hardware(&id).await.unwrap_err();
    assert!(matches!(err, WalletError::HardwareInitFailed(_)));

    // background init plus the explicit retry, three attempts each and no more
    for _ in 0..200 {
        if h.transport.opens.load(Ordering::SeqCst) >= 6 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_hardware_signing_fails_fast_when_closed() {
    let h = harness_with(HarnessOptions {
        hardware: fast_hardware_config(2),
        failing_opens: 100,
        ..Default::default()
    });
    let id = h.add_hardware().await;
    let _ = h.registry.retry_hardware(&id).await;

    let started = Instant::now();
    let err = h.registry.sign_message(ADDRESS_2, b"hi").await.unwrap_err();
    assert!(matches!(err, WalletError::HardwareInitFailed(_)));
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(h.transport.sign_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_hardware_recovers_after_retry() {
    let h = harness_with(HarnessOptions {
        hardware: fast_hardware_config(2),
        failing_opens: 1,
        ..Default::default()
    });
    let id = h.add_hardware().await;
    h.registry.retry_hardware(&id).await.unwrap();

    let signature = h.registry.sign_message(ADDRESS_2, b"hi").await.unwrap();
    assert_eq!(signature.recover_address_from_msg(b"hi").unwrap(), ADDRESS_2);

    h.registry.remove_keyring(&id).await.unwrap();
    assert_eq!(h.transport.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_restore_builds_multisig_after_owner() {
    let h = harness();
    let local_id = h.add_local().await;
    h.add_multisig(vec![1]).await;

    // descriptors sorted by id may put the multisig first; restore must cope
    let store = Arc::new(MemoryDescriptorStore::new());
    let local = h.registry.get(&local_id).unwrap();
    assert_eq!(local.keyring_type(), KeyringType::Local);
    store
        .save(
            "a-multisig",
            &KeyringDescriptor::new(
                KeyringType::MultisigCoordinator,
                serde_json::json!({
                    "owner": ADDRESS_0.to_string(),
                    "accounts": [{"address": SAFE.to_string(), "networkIds": [1]}]
                }),
            ),
        )
        .await
        .unwrap();
    let vault_only = wallet_gate::services::keyring::VaultSecret {
        private_keys: vec![KEY_0.to_string()],
        ..Default::default()
    };
    let (_, options) = wallet_gate::services::keyring::LocalSeedSigner::create(&vault_only, PASSWORD).unwrap();
    store
        .save("z-local", &KeyringDescriptor::new(KeyringType::Local, options))
        .await
        .unwrap();

    let restored = KeyringRegistry::new(
        store,
        h.bus.clone(),
        h.federation.clone(),
        Arc::new(MockTransportFactory {
            transport: h.transport.clone(),
        }),
        fast_hardware_config(1),
    );
    assert_eq!(restored.restore().await.unwrap(), 2);
    assert!(!restored.is_unlocked());

    // restored vaults start locked
    let err = restored.sign_message(ADDRESS_0, b"hi").await.unwrap_err();
    assert!(matches!(err, WalletError::Locked));
    restored.unlock(PASSWORD).unwrap();
    assert!(restored.sign_message(ADDRESS_0, b"hi").await.is_ok());
    assert_eq!(restored.get_accounts().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_wrong_password_keeps_wallet_locked() {
    let h = harness();
    h.add_local().await;
    assert!(h.registry.unlock("wrong").is_err());
    assert!(!h.registry.is_unlocked());

    h.registry.unlock(PASSWORD).unwrap();
    h.registry.lock();
    assert!(!h.registry.is_unlocked());
    assert!(matches!(
        h.registry.sign_message(ADDRESS_0, b"x").await,
        Err(WalletError::Locked)
    ));
}

#[tokio::test]
async fn test_partial_unlock_rolls_back() {
    let h = harness();
    h.add_local().await;
    let other = wallet_gate::services::keyring::VaultSecret {
        private_keys: vec![KEY_1.to_string()],
        ..Default::default()
    };
    h.registry.create_local(&other, "another password").await.unwrap();
    h.registry.lock();

    assert!(h.registry.unlock(PASSWORD).is_err());
    assert!(!h.registry.is_unlocked());
    for address in [ADDRESS_0, ADDRESS_1] {
        assert!(matches!(
            h.registry.sign_message(address, b"x").await,
            Err(WalletError::Locked)
        ));
    }
}
