//! Deadlock Tests
//!
//! Two exclusive units locking two leads in opposite order. The wait cycle
//! is broken by acquisition timeout: exactly one unit fails with
//! DeadlockDetected and holds nothing afterwards; the other commits.

use crate::*;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn tag_both(pipeline: &Pipeline, first: LeadId, second: LeadId, barrier: &Barrier, tag: char) -> Result<()> {
    pipeline.controller().run_exclusive(|session| {
        let a = session.read::<Lead>(first)?;
        barrier.wait();
        let b = session.read::<Lead>(second)?;

        let mut a = a.value;
        a.name.push(tag);
        session.write(a)?;
        let mut b = b.value;
        b.name.push(tag);
        session.write(b)?;
        Ok(())
    })
}

/// Test opposite-order acquisition fails exactly one caller
#[test]
fn test_opposite_order_cycle_fails_exactly_one() {
    let pipeline = Arc::new(
        Pipeline::builder()
            .lock_timeout(Duration::from_millis(100))
            .open()
            .unwrap(),
    );
    let a = pipeline.create_lead("A").unwrap().id;
    let b = pipeline.create_lead("B").unwrap().id;
    let barrier = Arc::new(Barrier::new(2));

    let spawn = |first: LeadId, second: LeadId, tag: char| {
        let pipeline = Arc::clone(&pipeline);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || tag_both(&pipeline, first, second, &barrier, tag))
    };
    let forward = spawn(a, b, '1');
    let backward = spawn(b, a, '2');

    let results = [forward.join().unwrap(), backward.join().unwrap()];

    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(failures.len(), 1, "results: {:?}", results);
    let failure = failures[0];
    assert!(matches!(failure, Error::DeadlockDetected { held: 1, .. }), "{}", failure);
    assert!(failure.is_lock_failure());
    assert!(!failure.is_retryable());

    // The survivor's writes landed on both leads; the victim's on neither.
    let winner = if results[0].is_ok() { '1' } else { '2' };
    let name_a = pipeline.lead(a).unwrap().value.name;
    let name_b = pipeline.lead(b).unwrap().value.name;
    assert_eq!(name_a, format!("A{}", winner));
    assert_eq!(name_b, format!("B{}", winner));
    assert!(pipeline.locks().is_empty());
}

/// The victim can retry once the survivor is done
#[test]
fn test_victim_can_retry_after_cycle() {
    let pipeline = Arc::new(
        Pipeline::builder()
            .lock_timeout(Duration::from_millis(100))
            .open()
            .unwrap(),
    );
    let a = pipeline.create_lead("A").unwrap().id;
    let b = pipeline.create_lead("B").unwrap().id;
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [(a, b, 'x'), (b, a, 'y')]
        .into_iter()
        .map(|(first, second, tag)| {
            let pipeline = Arc::clone(&pipeline);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let outcome = tag_both(&pipeline, first, second, &barrier, tag);
                match outcome {
                    Err(Error::DeadlockDetected { .. }) => {
                        // Retry alone, no partner to sync with.
                        let solo = Barrier::new(1);
                        tag_both(&pipeline, first, second, &solo, tag)
                    }
                    other => other,
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap().unwrap();
    }

    let name_a = pipeline.lead(a).unwrap().value.name;
    assert_eq!(name_a.len(), 3);
    assert!(name_a.contains('x') && name_a.contains('y'));
    assert_eq!(pipeline.lead(a).unwrap().version, Version::new(3));
    assert_eq!(pipeline.lead(b).unwrap().version, Version::new(3));
}

/// A victim that swallows DeadlockDetected cannot overwrite with stale data
#[test]
fn test_victim_cannot_commit_stale_overwrite() {
    let pipeline = Pipeline::builder()
        .lock_timeout(Duration::from_millis(30))
        .open()
        .unwrap();
    let a = pipeline.create_lead("A").unwrap().id;
    let b = pipeline.create_lead("B").unwrap().id;

    let outcome = pipeline.controller().run_exclusive(|holder| {
        holder.read::<Lead>(b)?;

        let victim = pipeline.controller().run_exclusive(|session| {
            let stale = session.read::<Lead>(a)?.value;
            let err = session.read::<Lead>(b).unwrap_err();
            assert!(matches!(err, Error::DeadlockDetected { held: 1, .. }), "{}", err);

            pipeline.update_with_lock::<Lead, _>(a, |mut lead| {
                lead.name.push_str("+other");
                Ok(lead)
            })?;

            let mut stale = stale;
            stale.name.push_str("+victim");
            session.write(stale)?;
            Ok(())
        });
        Ok(victim)
    });

    let err = outcome.unwrap().unwrap_err();
    assert!(
        matches!(err, Error::Conflict { reason: ConflictReason::LockLost, .. }),
        "{}",
        err
    );
    assert!(err.is_conflict());

    let stored = pipeline.lead(a).unwrap();
    assert_eq!(stored.value.name, "A+other");
    assert_eq!(stored.version, Version::new(2));
    assert!(pipeline.locks().is_empty());
}
