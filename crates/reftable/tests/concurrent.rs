//! Concurrent transaction stress test: independent backend handles over
//! the same directory, serialized only by the `tables.list` lock.

use std::sync::{Arc, Barrier};
use std::thread;

use reftable::{
    ident::{NullObjectDb, StaticIdentity},
    RefName, ReftableBackend, Transaction, UpdateFlags,
};
use reftable_hash::ObjectId;

fn open(dir: &std::path::Path) -> ReftableBackend {
    ReftableBackend::create(
        dir,
        Box::new(StaticIdentity::new("Stress Tester", "stress@example.com")),
        Box::new(NullObjectDb),
    )
}

#[test]
fn concurrent_creates_of_different_refs_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let repo_dir = dir.path().to_path_buf();

    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|i| {
            let repo_dir = repo_dir.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut backend = open(&repo_dir);
                let name = RefName::new(format!("refs/heads/thread-{i}")).unwrap();
                let oid = ObjectId::from_hex(&format!("{:0>40x}", i + 1)).unwrap();

                let mut attempts = 0;
                loop {
                    let mut tx = Transaction::new();
                    tx.add(name.clone(), UpdateFlags::HAVE_NEW, None, Some(oid), None)
                        .unwrap();
                    match tx.initial_commit(&mut backend) {
                        Ok(()) => break true,
                        Err(_) if attempts < 20 => attempts += 1,
                        Err(_) => break false,
                    }
                }
            })
        })
        .collect();

    let successes = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
    assert_eq!(successes, num_threads);

    let mut backend = open(&repo_dir);
    for i in 0..num_threads {
        let name = RefName::new(format!("refs/heads/thread-{i}")).unwrap();
        assert_ne!(backend.raw_read(&name).unwrap(), reftable::RawRead::NotFound);
    }
}

#[test]
fn concurrent_cas_updates_only_one_wins_per_round() {
    let dir = tempfile::tempdir().unwrap();
    let repo_dir = dir.path().to_path_buf();

    let initial_oid = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
    let name = RefName::new("refs/heads/contested").unwrap();
    {
        let mut backend = open(&repo_dir);
        let mut tx = Transaction::new();
        tx.add(name.clone(), UpdateFlags::HAVE_NEW, None, Some(initial_oid), None)
            .unwrap();
        tx.initial_commit(&mut backend).unwrap();
    }

    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|i| {
            let repo_dir = repo_dir.clone();
            let barrier = Arc::clone(&barrier);
            let name = name.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut backend = open(&repo_dir);
                let new_oid = ObjectId::from_hex(&format!("{:0>40x}", i + 100)).unwrap();
                let mut tx = Transaction::new();
                tx.add(
                    name.clone(),
                    UpdateFlags::HAVE_OLD | UpdateFlags::HAVE_NEW,
                    Some(initial_oid),
                    Some(new_oid),
                    None,
                )
                .unwrap();
                tx.initial_commit(&mut backend)
            })
        })
        .collect();

    let mut successes = 0;
    let mut failures = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(()) => successes += 1,
            Err(_) => failures += 1,
        }
    }

    assert_eq!(successes, 1, "exactly one CAS update should win against the same old value");
    assert!(failures > 0);

    let mut backend = open(&repo_dir);
    let result = backend.raw_read(&name).unwrap();
    assert_ne!(result, reftable::RawRead::Direct(initial_oid));
}
