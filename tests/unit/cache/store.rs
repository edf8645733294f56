use std::sync::Barrier;
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, SystemTime};

use super::*;
use crate::encode::gateway::EncoderError;

fn open(dir: &Path) -> CacheStore {
    CacheStore::open(dir, Namespace::for_profile("standard-test")).unwrap()
}

fn key_for(store: &CacheStore, name: &str) -> Fingerprint {
    store.key(
        &SourceSignature::File {
            path: name.to_owned(),
            size: 1,
            modified_unix_ns: 1,
        },
        OpKind::PhotoSlide,
        &OpParams::new().with("duration", 3.0),
    )
}

fn meta() -> EntryMeta {
    EntryMeta::new(OpKind::PhotoSlide, "a.jpg")
}

fn temp_files(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("temp")).unwrap().count()
}

#[test]
fn open_creates_layout() {
    let dir = tempfile::tempdir().unwrap();
    open(dir.path());
    for sub in ["clips", "frames", "temp"] {
        assert!(dir.path().join(sub).is_dir(), "{sub}");
    }
}

#[test]
fn put_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "a.jpg");

    assert!(store.get(&key, ArtifactKind::Clip).is_none());
    let put = store
        .put(&key, ArtifactKind::Clip, meta(), |tmp| {
            std::fs::write(tmp, b"clip-bytes").unwrap();
            Ok(())
        })
        .unwrap();
    assert_eq!(put.path, store.artifact_path(&key, ArtifactKind::Clip));
    assert_eq!(put.bytes, 10);
    assert_eq!(std::fs::read(&put.path).unwrap(), b"clip-bytes");

    let got = store.get(&key, ArtifactKind::Clip).unwrap();
    assert_eq!(got, put);

    let stats = store.stats().unwrap();
    assert_eq!((stats.hits, stats.misses), (1, 1));
    assert_eq!(stats.clip_entries, 1);
    assert_eq!(stats.total_bytes, 10);
    assert_eq!(temp_files(dir.path()), 0);

    store.reset_stats();
    let stats = store.stats().unwrap();
    assert_eq!((stats.hits, stats.misses), (0, 0));
}

#[test]
fn existing_entry_skips_producer() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "a.jpg");
    store
        .put(&key, ArtifactKind::Frame, meta(), |tmp| {
            std::fs::write(tmp, b"png").unwrap();
            Ok(())
        })
        .unwrap();
    let again = store
        .get_or_put(&key, ArtifactKind::Frame, meta(), |_| {
            panic!("producer must not run for a published key")
        })
        .unwrap();
    assert_eq!(std::fs::read(again.path).unwrap(), b"png");
}

#[test]
fn failed_producer_publishes_nothing_and_cleans_temp() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "a.jpg");
    let err = store
        .put(&key, ArtifactKind::Clip, meta(), |tmp| {
            std::fs::write(tmp, b"partial").unwrap();
            Err(ReelError::validation("encoder blew up"))
        })
        .unwrap_err();
    assert!(err.to_string().contains("encoder blew up"));
    assert!(store.get(&key, ArtifactKind::Clip).is_none());
    assert_eq!(temp_files(dir.path()), 0);
}

#[test]
fn empty_artifact_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "a.jpg");
    let err = store
        .put(&key, ArtifactKind::Clip, meta(), |tmp| {
            std::fs::write(tmp, b"").unwrap();
            Ok(())
        })
        .unwrap_err();
    assert_eq!(err.kind(), crate::foundation::error::ErrorKind::CacheWrite);
}

#[test]
fn concurrent_puts_run_one_producer() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "shared.jpg");
    let calls = AtomicUsize::new(0);
    let barrier = Barrier::new(8);

    let results: Vec<Artifact> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    store
                        .put(&key, ArtifactKind::Clip, meta(), |tmp| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(50));
                            std::fs::write(tmp, b"once").unwrap();
                            Ok(())
                        })
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|a| a == &results[0]));
}

#[test]
fn waiters_see_leader_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "bad.jpg");
    let barrier = Barrier::new(4);

    let errors: Vec<ReelError> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    store
                        .put(&key, ArtifactKind::Clip, meta(), |_| {
                            std::thread::sleep(Duration::from_millis(50));
                            Err(ReelError::validation("nope"))
                        })
                        .unwrap_err()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(errors.iter().all(|e| e.to_string().contains("nope")), "{errors:?}");
    assert!(errors.iter().all(|e| e.kind() == ErrorKind::Validation), "{errors:?}");
    assert!(store.get(&key, ArtifactKind::Clip).is_none());
}

fn flight_refs(store: &CacheStore, key: &Fingerprint) -> usize {
    lock(&store.inflight).get(key).map_or(0, Arc::strong_count)
}

fn wait_for_refs(store: &CacheStore, key: &Fingerprint, refs: usize) {
    while flight_refs(store, key) < refs {
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Runs `leader` as the producer of `key` and returns (leader result, waiter result), where the
/// waiter is registered on the in-flight key before the producer body runs.
fn lead_with_waiter<F>(
    store: &CacheStore,
    key: &Fingerprint,
    leader: F,
) -> (std::thread::Result<ReelResult<Artifact>>, ReelResult<Artifact>)
where
    F: FnOnce() -> ReelResult<()> + Send,
{
    std::thread::scope(|s| {
        let leading = s.spawn(|| {
            store.put(key, ArtifactKind::Clip, meta(), |_| {
                // Map entry, the leader's own handle, and the waiter's handle.
                wait_for_refs(store, key, 3);
                leader()
            })
        });
        wait_for_refs(store, key, 2);
        let waiting = s.spawn(|| {
            store.put(key, ArtifactKind::Clip, meta(), |_| panic!("waiter must not produce"))
        });
        let leader_result = leading.join();
        (leader_result, waiting.join().unwrap())
    })
}

#[test]
fn waiter_reports_the_leader_failure_kind() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "slow.jpg");

    let (leader, waiter) = lead_with_waiter(&store, &key, || {
        Err(ReelError::Encoder(EncoderError::Timeout { secs: 1 }))
    });
    let leader = leader.unwrap().unwrap_err();
    let waiter = waiter.unwrap_err();
    assert_eq!(leader.kind(), ErrorKind::Encoder);
    assert_eq!(waiter.kind(), ErrorKind::Encoder);
    assert!(matches!(waiter, ReelError::Concurrent { .. }), "{waiter:?}");
    assert!(waiter.to_string().contains(&key.to_hex()), "{waiter}");
}

#[test]
fn panicking_producer_releases_its_key() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "crash.jpg");

    let (leader, waiter) = lead_with_waiter(&store, &key, || panic!("decoder crashed"));
    assert!(leader.is_err());
    let waiter = waiter.unwrap_err();
    assert_eq!(waiter.kind(), ErrorKind::Internal);
    assert!(waiter.to_string().contains("panicked"), "{waiter}");
    assert_eq!(flight_refs(&store, &key), 0);
    assert_eq!(temp_files(dir.path()), 0);

    // The key is free again: a later put produces instead of waiting forever.
    let artifact = store
        .put(&key, ArtifactKind::Clip, meta(), |tmp| {
            std::fs::write(tmp, b"x").unwrap();
            Ok(())
        })
        .unwrap();
    assert!(artifact.path.is_file());
}

#[test]
fn namespace_switch_changes_keys_without_deleting() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let before = key_for(&store, "a.jpg");
    store
        .put(&before, ArtifactKind::Clip, meta(), |tmp| {
            std::fs::write(tmp, b"x").unwrap();
            Ok(())
        })
        .unwrap();

    store.invalidate_namespace(InvalidationScope::Profile("high-test".to_owned()));
    let after = key_for(&store, "a.jpg");
    assert_ne!(before, after);
    assert!(store.get(&after, ArtifactKind::Clip).is_none());
    assert!(store.artifact_path(&before, ArtifactKind::Clip).is_file());

    store.invalidate_namespace(InvalidationScope::SourceSet("trip".to_owned()));
    assert_eq!(store.namespace().scope_id(), "high-test|trip");
    assert_ne!(key_for(&store, "a.jpg"), after);
}

#[test]
fn entries_carry_sidecar_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "a.jpg");
    store
        .put(&key, ArtifactKind::Clip, meta(), |tmp| {
            std::fs::write(tmp, b"abc").unwrap();
            Ok(())
        })
        .unwrap();
    let entries = store.entries().unwrap();
    assert_eq!(entries.len(), 1);
    let e = &entries[0];
    assert_eq!(e.key, key);
    assert_eq!(e.op, Some(OpKind::PhotoSlide));
    assert_eq!(e.source, "a.jpg");
    assert_eq!(e.namespace, "standard-test");
    assert_eq!(e.bytes, 3);

    std::thread::sleep(Duration::from_millis(5));
    store.get(&key, ArtifactKind::Clip).unwrap();
    let touched = &store.entries().unwrap()[0];
    assert!(touched.last_used_at > e.last_used_at);
    assert_eq!(touched.created_at, e.created_at);
}

#[test]
fn clear_and_prune_remove_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    for name in ["a.jpg", "b.jpg"] {
        let key = key_for(&store, name);
        store
            .put(&key, ArtifactKind::Clip, meta(), |tmp| {
                std::fs::write(tmp, b"x").unwrap();
                Ok(())
            })
            .unwrap();
    }
    assert_eq!(store.remove_older_than(chrono::Duration::days(1)).unwrap(), 0);
    assert_eq!(store.remove_older_than(chrono::Duration::seconds(-1)).unwrap(), 2);
    assert!(store.entries().unwrap().is_empty());

    let key = key_for(&store, "c.jpg");
    store
        .put(&key, ArtifactKind::Frame, meta(), |tmp| {
            std::fs::write(tmp, b"x").unwrap();
            Ok(())
        })
        .unwrap();
    assert_eq!(store.clear().unwrap(), 1);
    assert_eq!(store.stats().unwrap().entries(), 0);
}

#[test]
fn clear_keeps_recent_temps_of_other_processes() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let temp = dir.path().join("temp");
    let foreign = temp.join("0123456789abcdef_4294967295_1_0.mp4");
    let foreign_stale = temp.join("fedcba9876543210_4294967294_1_0.mp4");
    let own = temp.join(unique_name("0123456789abcdef", "mp4"));
    for path in [&foreign, &foreign_stale, &own] {
        std::fs::write(path, b"partial").unwrap();
    }
    std::fs::File::options()
        .write(true)
        .open(&foreign_stale)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(2 * 60 * 60))
        .unwrap();

    store.clear().unwrap();
    assert!(foreign.is_file());
    assert!(!foreign_stale.exists());
    assert!(!own.exists());
}

#[test]
fn purge_temp_removes_in_flight_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let key = key_for(&store, "a.jpg");
    let mut purged = 0;
    let err = store
        .put(&key, ArtifactKind::Clip, meta(), |tmp| {
            std::fs::write(tmp, b"in flight").unwrap();
            assert_eq!(temp_files(dir.path()), 1);
            purged = store.purge_temp();
            Ok(())
        })
        .unwrap_err();
    assert_eq!(purged, 1);
    assert!(matches!(err, ReelError::CacheWrite(_)));
    assert_eq!(temp_files(dir.path()), 0);
    assert!(store.get(&key, ArtifactKind::Clip).is_none());
}

#[test]
fn publish_keeps_first_writer() {
    let dir = tempfile::tempdir().unwrap();
    let dst = dir.path().join("dst.mp4");
    let first = dir.path().join("first.tmp");
    let second = dir.path().join("second.tmp");
    std::fs::write(&first, b"first").unwrap();
    std::fs::write(&second, b"second").unwrap();
    publish_no_overwrite(&first, &dst).unwrap();
    publish_no_overwrite(&second, &dst).unwrap();
    assert_eq!(std::fs::read(&dst).unwrap(), b"first");
    assert!(!first.exists());
    assert!(!second.exists());
}
