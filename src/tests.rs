//! End-to-end scenarios: layered envelope pipelines published through the
//! staged writer and read back through the remote key set.

use std::sync::Arc;

use crate::crypter::{Crypter, Encrypter};
use crate::crypto::credential::testutil;
use crate::crypto::envelope::EnvelopeCrypter;
use crate::error::StrataError;
use crate::keyset::metadata::{KeyKind, KeyMetadata, KeyPurpose, KeyStatus, HEADER_LEN};
use crate::keyset::mutable::MutableKeySet;
use crate::keyset::{KeyLayer, KeySet, KeySetWriter, LayeredKeySet, LayeredKeySetWriter};
use crate::storage::memory::MemoryObjectStore;
use crate::storage::remote::RemoteKeySet;
use crate::storage::staged::StagedKeySetWriter;
use crate::storage::ObjectStore;

const INPUT: &[u8] = b"This is some test data";

fn symmetric_meta(name: &str) -> KeyMetadata {
    KeyMetadata::new(name, KeyPurpose::EncryptDecrypt, KeyKind::Symmetric)
}

fn envelope_layers() -> Vec<Box<dyn KeyLayer>> {
    vec![Box::new(EnvelopeCrypter::new(testutil::credential()))]
}

async fn staged(store: &Arc<MemoryObjectStore>, path: &str) -> StagedKeySetWriter {
    StagedKeySetWriter::open(store.clone() as Arc<dyn ObjectStore>, path)
        .await
        .unwrap()
}

fn remote(store: &Arc<MemoryObjectStore>, path: &str) -> RemoteKeySet {
    RemoteKeySet::new(store.clone() as Arc<dyn ObjectStore>, path)
}

#[tokio::test]
async fn envelope_round_trip_through_staged_publish() {
    let store = Arc::new(MemoryObjectStore::new());
    let path = "round-trip";

    let base = staged(&store, path).await;
    let mut writer = LayeredKeySetWriter::layer(Box::new(base), envelope_layers());
    writer.write_key(INPUT, 1).await.unwrap();
    writer
        .write_metadata(&symmetric_meta("RoundTrip"))
        .await
        .unwrap();
    assert!(writer.finish().await.unwrap());

    // Raw bytes at rest are an envelope, not the payload
    let at_rest = store.object("round-trip/1").await.unwrap();
    assert_ne!(at_rest, INPUT);

    let layered = LayeredKeySet::layer(Box::new(remote(&store, path)), envelope_layers());
    assert_eq!(layered.get_key_data(1).await.unwrap(), INPUT);
    assert!(layered.metadata().await.unwrap().encrypted);
}

#[tokio::test]
async fn wrong_credential_cannot_read_published_set() {
    let store = Arc::new(MemoryObjectStore::new());
    let path = "wrong-cred";

    let base = staged(&store, path).await;
    let mut writer = LayeredKeySetWriter::layer(Box::new(base), envelope_layers());
    writer.write_key(INPUT, 1).await.unwrap();
    writer
        .write_metadata(&symmetric_meta("WrongCred"))
        .await
        .unwrap();
    assert!(writer.finish().await.unwrap());

    let other: Vec<Box<dyn KeyLayer>> =
        vec![Box::new(EnvelopeCrypter::new(testutil::other_credential()))];
    let layered = LayeredKeySet::layer(Box::new(remote(&store, path)), other);
    assert!(matches!(
        layered.get_key_data(1).await,
        Err(StrataError::KeyMismatch)
    ));
}

#[tokio::test]
async fn layered_publish_and_mutable_reload() {
    let store = Arc::new(MemoryObjectStore::new());
    let path = "reload";

    let mut set = MutableKeySet::new(symmetric_meta("Reload"));
    set.add_key(KeyStatus::Primary).unwrap();
    let original_key = set.get_key_data(1).await.unwrap();

    let base = staged(&store, path).await;
    let mut writer = LayeredKeySetWriter::layer(Box::new(base), envelope_layers());
    assert!(set.save(&mut writer).await.unwrap());

    let layered = LayeredKeySet::layer(Box::new(remote(&store, path)), envelope_layers());
    let reloaded = MutableKeySet::from_key_set(&layered).await.unwrap();
    assert_eq!(reloaded.get_key_data(1).await.unwrap(), original_key);
    // The reloaded set holds plaintext; the published metadata says sealed
    assert!(!reloaded.metadata().await.unwrap().encrypted);
    assert!(remote(&store, path).metadata().await.unwrap().encrypted);
}

#[tokio::test]
async fn primary_rotation_survives_publish() {
    let store = Arc::new(MemoryObjectStore::new());
    let path = "no-primary";

    let mut set = MutableKeySet::new(symmetric_meta("NoPrimary"));
    assert_eq!(set.add_key(KeyStatus::Primary).unwrap(), 1);
    let mut writer = staged(&store, path).await;
    assert!(set.save(&mut writer).await.unwrap());

    // Encrypt while version 1 is primary
    let reader = remote(&store, path);
    let ciphertext = Encrypter::new(&reader).encrypt(INPUT).await.unwrap();

    // Demote to Active, add no replacement, publish again
    let mut set = MutableKeySet::from_key_set(&remote(&store, path)).await.unwrap();
    assert_eq!(set.demote(1).unwrap(), KeyStatus::Active);
    let mut writer = staged(&store, path).await;
    assert!(set.save(&mut writer).await.unwrap());

    let reloaded = remote(&store, path);
    let metadata = reloaded.metadata().await.unwrap();
    assert!(metadata.primary_version().is_none());
    assert_eq!(metadata.version(1).unwrap().status, KeyStatus::Active);

    // No primary, so new encryptions fail, but old ciphertexts still open
    assert!(matches!(
        Encrypter::new(&reloaded).encrypt(INPUT).await,
        Err(StrataError::NoPrimaryKey)
    ));
    assert_eq!(Crypter::new(&reloaded).decrypt(&ciphertext).await.unwrap(), INPUT);
}

#[tokio::test]
async fn recreated_version_carries_a_new_key_identifier() {
    let store = Arc::new(MemoryObjectStore::new());
    let path = "revoke-overwrite";

    let mut set = MutableKeySet::new(symmetric_meta("RevokeOverwrite"));
    assert_eq!(set.add_key(KeyStatus::Primary).unwrap(), 1);
    let mut writer = staged(&store, path).await;
    assert!(set.save(&mut writer).await.unwrap());

    let original_key_id = remote(&store, path).metadata().await.unwrap().versions[0].key_id;
    let original_ciphertext = Encrypter::new(&remote(&store, path))
        .encrypt(INPUT)
        .await
        .unwrap();
    assert_eq!(&original_ciphertext[1..HEADER_LEN], original_key_id.as_slice());

    // Retire version 1 completely and publish the empty set
    let mut set = MutableKeySet::from_key_set(&remote(&store, path)).await.unwrap();
    assert_eq!(set.demote(1).unwrap(), KeyStatus::Active);
    assert_eq!(set.demote(1).unwrap(), KeyStatus::Inactive);
    set.revoke(1).unwrap();
    let mut writer = staged(&store, path).await;
    assert!(set.save(&mut writer).await.unwrap());
    assert!(remote(&store, path).metadata().await.unwrap().versions.is_empty());

    // Recreate version 1 from fresh metadata
    let mut set = MutableKeySet::new(symmetric_meta("RevokeOverwrite"));
    assert_eq!(set.add_key(KeyStatus::Primary).unwrap(), 1);
    let mut writer = staged(&store, path).await;
    assert!(set.save(&mut writer).await.unwrap());

    let metadata = remote(&store, path).metadata().await.unwrap();
    let new_key_id = metadata.versions[0].key_id;
    let new_ciphertext = Encrypter::new(&remote(&store, path))
        .encrypt(INPUT)
        .await
        .unwrap();

    // The recreated version 1 is a different key on the wire
    assert_ne!(new_key_id, original_key_id);
    assert_eq!(&new_ciphertext[1..HEADER_LEN], new_key_id.as_slice());
    assert_ne!(&new_ciphertext[1..HEADER_LEN], original_key_id.as_slice());
}
