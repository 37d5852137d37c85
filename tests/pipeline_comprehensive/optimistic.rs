//! Optimistic Discipline Tests
//!
//! Tests for version-conditioned writes:
//! - A stale write is rejected with Conflict and writes nothing
//! - Retry re-reads and succeeds against the new version
//! - Exhausted retries surface Conflict
//! - Concurrent optimistic updates all land given enough attempts

use crate::*;
use std::cell::Cell;
use std::sync::{Arc, Barrier};
use std::thread;

/// A write based on a superseded read fails with VersionMismatch
#[test]
fn test_stale_write_conflicts() {
    let pipeline = create_pipeline();
    let lead = pipeline.create_lead("Acme").unwrap();

    let err = pipeline
        .controller()
        .with_new_unit_of_work(Discipline::Optimistic, |session| {
            let read = session.read::<Lead>(lead.id)?;
            // Another caller commits in between.
            pipeline
                .update_with_lock::<Lead, _>(lead.id, |mut l| {
                    l.name.push_str(" Corp");
                    Ok(l)
                })
                .unwrap();
            let mut next = read.value;
            next.name.push_str(" Ltd");
            session.write(next)
        })
        .unwrap_err();

    assert_eq!(
        err,
        Error::Conflict {
            entity: pipeline::EntityKey::Lead(lead.id),
            reason: ConflictReason::VersionMismatch {
                expected: Version::new(1),
                actual: Version::new(2),
            },
        }
    );
    assert!(err.is_retryable());
    let stored = pipeline.lead(lead.id).unwrap();
    assert_eq!(stored.value.name, "Acme Corp");
    assert_eq!(stored.version, Version::new(2));
}

/// Retry recovers from one interfering commit
#[test]
fn test_retry_succeeds_against_new_version() {
    let pipeline = create_pipeline();
    let lead = pipeline.create_lead("n").unwrap();
    let attempts = Cell::new(0);

    let updated = pipeline
        .update_with_retry::<Lead, _>(
            lead.id,
            |mut l| {
                attempts.set(attempts.get() + 1);
                if attempts.get() == 1 {
                    pipeline
                        .update_with_lock::<Lead, _>(lead.id, |mut other| {
                            other.name.push('a');
                            Ok(other)
                        })
                        .unwrap();
                }
                l.name.push('b');
                Ok(l)
            },
            3,
        )
        .unwrap();

    assert_eq!(attempts.get(), 2);
    assert_eq!(updated.value.name, "nab");
    assert_eq!(updated.version, Version::new(3));
    assert_eq!(pipeline.lead(lead.id).unwrap(), updated);
}

/// Every attempt loses its race: Conflict surfaces after the budget
#[test]
fn test_retry_exhaustion_surfaces_conflict() {
    let pipeline = create_pipeline();
    let lead = pipeline.create_lead("n").unwrap();
    let attempts = Cell::new(0u32);

    let err = pipeline
        .update_with_retry::<Lead, _>(
            lead.id,
            |mut l| {
                attempts.set(attempts.get() + 1);
                pipeline
                    .update_with_lock::<Lead, _>(lead.id, |mut other| {
                        other.name.push('a');
                        Ok(other)
                    })
                    .unwrap();
                l.name.push('b');
                Ok(l)
            },
            3,
        )
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(attempts.get(), 3);
    let stored = pipeline.lead(lead.id).unwrap();
    assert_eq!(stored.value.name, "naaa");
    assert_eq!(stored.version, Version::new(4));
}

/// A budget of one attempt means no retry
#[test]
fn test_single_attempt_no_retry() {
    let pipeline = create_pipeline();
    let lead = pipeline.create_lead("n").unwrap();
    let attempts = Cell::new(0u32);

    let err = pipeline
        .update_with_retry::<Lead, _>(
            lead.id,
            |l| {
                attempts.set(attempts.get() + 1);
                pipeline
                    .update_with_lock::<Lead, _>(lead.id, |other| Ok(other))
                    .unwrap();
                Ok(l)
            },
            1,
        )
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(attempts.get(), 1);
}

/// Non-conflict errors are never retried
#[test]
fn test_business_errors_not_retried() {
    let pipeline = create_pipeline();
    let lead = pipeline.create_lead("n").unwrap();
    let attempts = Cell::new(0u32);

    let err = pipeline
        .update_with_retry::<Lead, _>(
            lead.id,
            |_| {
                attempts.set(attempts.get() + 1);
                Err(Error::Storage("rejected".into()))
            },
            5,
        )
        .unwrap_err();

    assert_eq!(err, Error::Storage("rejected".into()));
    assert_eq!(attempts.get(), 1);

    let err = pipeline
        .update_with_retry::<Lead, _>(LeadId::new(), Ok, 5)
        .unwrap_err();
    assert!(err.is_not_found());
}

/// Two racing optimistic updates: both land once retried
#[test]
fn test_concurrent_optimistic_updates_all_land() {
    const NUM_THREADS: usize = 4;
    const UPDATES_PER_THREAD: usize = 10;

    let pipeline = Arc::new(create_pipeline());
    let lead = pipeline.create_lead("").unwrap();
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..UPDATES_PER_THREAD {
                    pipeline
                        .update_with_retry::<Lead, _>(
                            lead.id,
                            |mut l| {
                                l.name.push('+');
                                Ok(l)
                            },
                            1_000,
                        )
                        .unwrap();
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
}

/// Optimistic writers are refused while an exclusive holder has the entity
#[test]
fn test_optimistic_write_refused_under_exclusive_holder() {
    let pipeline = create_pipeline();
    let lead = pipeline.create_lead("Acme").unwrap();

    let err = pipeline
        .controller()
        .run_exclusive(|session| {
            session.read::<Lead>(lead.id)?;
            pipeline.update_with_retry::<Lead, _>(lead.id, Ok, 1)
        })
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Conflict {
            reason: ConflictReason::Locked,
            ..
        }
    ));
    assert_eq!(pipeline.lead(lead.id).unwrap().version, Version::new(1));
    assert!(pipeline.locks().is_empty());
}
