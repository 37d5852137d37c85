//! Exclusive Discipline Tests
//!
//! Tests for lock-before-read updates:
//! - Concurrent updates on one entity never interleave
//! - A waiter observes the holder's committed write
//! - Failed mutations write nothing and release the handle
//! - Acquisition gives up after the configured timeout

use crate::*;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn append(tag: char) -> impl FnOnce(Lead) -> Result<Lead> {
    move |mut lead| {
        lead.name.push(tag);
        Ok(lead)
    }
}

/// Test that no exclusive update is lost under contention
#[test]
fn test_concurrent_updates_never_lost() {
    const NUM_THREADS: usize = 8;
    const UPDATES_PER_THREAD: usize = 20;

    let pipeline = Arc::new(create_pipeline());
    let lead = pipeline.create_lead("").unwrap();
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            let barrier = Arc::clone(&barrier);
            let tag = char::from(b'a' + i as u8);

            thread::spawn(move || {
                barrier.wait();
                for _ in 0..UPDATES_PER_THREAD {
                    pipeline.update_with_lock::<Lead, _>(lead.id, append(tag)).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let stored = pipeline.lead(lead.id).unwrap();
    assert_eq!(stored.value.name.len(), NUM_THREADS * UPDATES_PER_THREAD);
    assert_eq!(stored.version.get(), 1 + (NUM_THREADS * UPDATES_PER_THREAD) as u64);
    for i in 0..NUM_THREADS {
        let tag = char::from(b'a' + i as u8);
        assert_eq!(stored.value.name.matches(tag).count(), UPDATES_PER_THREAD);
    }
}

/// The second exclusive caller reads only after the first commits
#[test]
fn test_waiter_sees_holder_commit() {
    let pipeline = Arc::new(create_pipeline());
    let lead = pipeline.create_lead("x").unwrap();
    let (held_tx, held_rx) = mpsc::channel();

    let holder = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || {
            pipeline
                .controller()
                .run_exclusive(|session| {
                    let current = session.read::<Lead>(lead.id)?;
                    held_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(50));
                    let mut next = current.value;
                    next.name.push('1');
                    session.write(next)
                })
                .unwrap()
        })
    };

    held_rx.recv().unwrap();
    let waiter = pipeline
        .update_with_lock::<Lead, _>(lead.id, |mut l| {
            assert_eq!(l.name, "x1", "read before the holder committed");
            l.name.push('2');
            Ok(l)
        })
        .unwrap();

    assert_eq!(holder.join().unwrap(), Version::new(2));
    assert_eq!(waiter.value.name, "x12");
    assert_eq!(waiter.version, Version::new(3));
}

/// A mutation error leaves the entity untouched and frees the handle
#[test]
fn test_failed_mutation_releases_lock() {
    let pipeline = create_pipeline();
    let lead = pipeline.create_lead("Acme").unwrap();
    let before = pipeline.lead(lead.id).unwrap();

    let err = pipeline
        .update_with_lock::<Lead, _>(lead.id, |_| Err(Error::Storage("downstream unavailable".into())))
        .unwrap_err();

    assert_eq!(err, Error::Storage("downstream unavailable".into()));
    assert_eq!(pipeline.lead(lead.id).unwrap(), before);
    assert!(pipeline.locks().is_empty());

    pipeline
        .update_with_lock::<Lead, _>(lead.id, append('!'))
        .unwrap();
    assert_eq!(pipeline.lead(lead.id).unwrap().value.name, "Acme!");
}

/// Missing entity is NotFound and holds nothing
#[test]
fn test_missing_entity() {
    let pipeline = create_pipeline();
    let err = pipeline
        .update_with_lock::<Lead, _>(LeadId::new(), append('x'))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(pipeline.locks().is_empty());
}

/// A caller holding nothing times out with LockTimeout
#[test]
fn test_acquisition_timeout() {
    let pipeline = Arc::new(
        Pipeline::builder()
            .lock_timeout(Duration::from_millis(50))
            .open()
            .unwrap(),
    );
    let lead = pipeline.create_lead("Acme").unwrap();
    let (held_tx, held_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let holder = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || {
            pipeline.controller().run_exclusive(|session| {
                session.read::<Lead>(lead.id)?;
                held_tx.send(()).unwrap();
                done_rx.recv().unwrap();
                Ok(())
            })
        })
    };

    held_rx.recv().unwrap();
    let err = pipeline
        .update_with_lock::<Lead, _>(lead.id, append('x'))
        .unwrap_err();
    done_tx.send(()).unwrap();
    holder.join().unwrap().unwrap();

    assert!(matches!(err, Error::LockTimeout { .. }));
    assert!(err.is_lock_failure());
    assert!(!err.is_retryable());
    assert_eq!(pipeline.lead(lead.id).unwrap().value.name, "Acme");
    assert!(pipeline.locks().is_empty());
}

/// Exclusive workflows on different entities do not wait on each other
#[test]
fn test_different_entities_independent() {
    let pipeline = Arc::new(create_exclusive_pipeline());
    let deals: Vec<_> = (0..4).map(|_| deal_at(&pipeline, DealStage::New)).collect();
    let barrier = Arc::new(Barrier::new(deals.len()));

    let handles: Vec<_> = deals
        .iter()
        .map(|deal| {
            let pipeline = Arc::clone(&pipeline);
            let barrier = Arc::clone(&barrier);
            let id = deal.id();
            thread::spawn(move || {
                barrier.wait();
                for step in deal_path(DealStage::Won) {
                    pipeline.transition_deal(id, *step).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    for deal in deals {
        assert_eq!(pipeline.deal(deal.id()).unwrap().value.stage, DealStage::Won);
    }
}
