use super::*;
use crate::queue::Builder;
use crate::sync::Event;
use crate::test_utils::wait_until;
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn current_is_none_on_a_fresh_thread() {
    thread::spawn(|| assert!(Voucher::current().is_none()))
        .join()
        .unwrap();
}

#[test]
fn current_or_create_is_idempotent() {
    thread::spawn(|| {
        let first = Voucher::current_or_create();
        let second = Voucher::current_or_create();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Voucher::current().is_some_and(|v| Arc::ptr_eq(&v, &first)));
    })
    .join()
    .unwrap();
}

#[test]
fn scoped_setter_restores_previous_value() {
    thread::spawn(|| {
        let outer = Arc::new(Voucher::new());
        let inner = Arc::new(Voucher::new());

        let _a = ScopedSetter::new(Some(outer.clone()));
        {
            let _b = ScopedSetter::new(Some(inner.clone()));
            assert!(Voucher::current().is_some_and(|v| Arc::ptr_eq(&v, &inner)));
        }
        assert!(Voucher::current().is_some_and(|v| Arc::ptr_eq(&v, &outer)));

        {
            let _c = ScopedSetter::new(None);
            assert!(Voucher::current().is_none());
        }
        assert!(Voucher::current().is_some_and(|v| Arc::ptr_eq(&v, &outer)));
    })
    .join()
    .unwrap();
}

// A voucher current at post time must be current inside the posted task,
// by identity, even though the task runs on the worker thread; afterwards
// the worker must be back to no voucher.
#[test]
fn propagates_across_post_and_is_restored() {
    let queue = Builder::new("voucher-test").try_build().unwrap();
    let handle = queue.handle();

    let posted = Arc::new(Event::new());
    let checked = Arc::new(Event::new());

    thread::spawn({
        let handle = handle.clone();
        let posted = posted.clone();
        move || {
            let mine = Voucher::current_or_create();
            let posted = posted.clone();
            handle.post(move || {
                assert!(Voucher::current().is_some_and(|v| Arc::ptr_eq(&v, &mine)));
                posted.set();
            });
        }
    })
    .join()
    .unwrap();
    assert!(posted.wait(TIMEOUT));

    // Posted from a context with no voucher: the worker must not have kept
    // the previous task's voucher around.
    thread::spawn({
        let handle = handle.clone();
        let checked = checked.clone();
        move || {
            handle.post(move || {
                assert!(Voucher::current().is_none());
                checked.set();
            });
        }
    })
    .join()
    .unwrap();
    assert!(checked.wait(TIMEOUT));
}

#[test]
fn propagates_across_delayed_post() {
    let queue = Builder::new("voucher-delayed").try_build().unwrap();
    let handle = queue.handle();
    let done = Arc::new(Event::new());

    thread::spawn({
        let done = done.clone();
        move || {
            let mine = Voucher::current_or_create();
            handle.post_delayed(Duration::from_millis(5), move || {
                assert!(Voucher::current().is_some_and(|v| Arc::ptr_eq(&v, &mine)));
                done.set();
            });
        }
    })
    .join()
    .unwrap();
    assert!(done.wait(TIMEOUT));
}

// A task that lazily creates a voucher for itself must not leak it into the
// next unrelated task on the same worker.
#[test]
fn task_local_voucher_does_not_leak_to_next_task() {
    let queue = Builder::new("voucher-leak").try_build().unwrap();
    let handle = queue.handle();
    let done = Arc::new(Event::new());

    handle.post(|| {
        let _ = Voucher::current_or_create();
        assert!(Voucher::current().is_some());
    });
    handle.post({
        let done = done.clone();
        move || {
            assert!(Voucher::current().is_none());
            done.set();
        }
    });
    assert!(done.wait(TIMEOUT));
}

#[test]
fn distinct_posters_see_distinct_vouchers() {
    let queue = Builder::new("voucher-distinct").try_build().unwrap();
    let handle = queue.handle();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let spawn_poster = |id: u32| {
        let handle = handle.clone();
        let seen = seen.clone();
        thread::spawn(move || {
            let mine = Voucher::current_or_create();
            handle.post(move || {
                let current = Voucher::current().expect("voucher should propagate");
                assert!(Arc::ptr_eq(&current, &mine));
                seen.lock().push(id);
            });
        })
    };
    let posters: Vec<_> = (0..4).map(spawn_poster).collect();
    for poster in posters {
        poster.join().unwrap();
    }

    assert!(wait_until(TIMEOUT, || seen.lock().len() == 4));
}

#[test]
fn annex_slots_are_typed_and_independent() {
    struct TraceId(u64);
    struct QuotaLeft(i32);

    let voucher = Arc::new(Voucher::new());
    voucher.set_annex(TraceId(7));
    voucher.set_annex(QuotaLeft(100));
    assert_eq!(voucher.annex_count(), 2);

    voucher.with_annex::<TraceId, _>(|slot| {
        assert_eq!(slot.expect("slot present").0, 7);
    });
    voucher.with_annex::<QuotaLeft, _>(|slot| {
        let quota = slot.expect("slot present");
        quota.0 -= 1;
    });
    voucher.with_annex::<QuotaLeft, _>(|slot| {
        assert_eq!(slot.expect("slot present").0, 99);
    });
}

#[test]
fn annex_set_replaces_and_remove_clears() {
    struct TraceId(u64);

    let voucher = Arc::new(Voucher::new());
    voucher.set_annex(TraceId(1));
    voucher.set_annex(TraceId(2));
    assert_eq!(voucher.annex_count(), 1);
    voucher.with_annex::<TraceId, _>(|slot| assert_eq!(slot.expect("slot present").0, 2));

    assert!(voucher.remove_annex::<TraceId>());
    assert!(!voucher.remove_annex::<TraceId>());
    voucher.with_annex::<TraceId, _>(|slot| assert!(slot.is_none()));
}

#[test]
fn annex_missing_slot_reads_none() {
    struct NeverSet;

    let voucher = Arc::new(Voucher::new());
    voucher.with_annex::<NeverSet, _>(|slot| assert!(slot.is_none()));
}
