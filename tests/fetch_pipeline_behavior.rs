//! Behavior-driven tests for the background fetch pipeline
//!
//! These tests verify HOW a fetch cycle walks its targets: ordering, retries,
//! pausing, cancellation and quota sharing between workers.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bondscope_tests::*;

#[derive(Default)]
struct Collected {
    results: Vec<BondCoupons>,
    progress: Vec<Progress>,
    logs: Vec<String>,
}

fn collecting(collected: &Rc<RefCell<Collected>>) -> FetchCallbacks<BondCoupons> {
    let results = Rc::clone(collected);
    let progress = Rc::clone(collected);
    let logs = Rc::clone(collected);
    FetchCallbacks::new()
        .on_result(move |payload| results.borrow_mut().results.push(payload))
        .on_progress(move |update| progress.borrow_mut().progress.push(update))
        .on_log(move |line| logs.borrow_mut().logs.push(line.to_owned()))
}

// =============================================================================
// Fetch Pipeline: Pause and Stop
// =============================================================================

#[test]
fn when_worker_is_paused_after_third_target_and_stopped_system_never_requests_the_rest() {
    // Given: Ten bonds and an API that holds the third request in flight
    let api = Arc::new(ScriptedApi::new());
    api.hold_call(3);
    let targets = uids(10);
    let collected = Rc::new(RefCell::new(Collected::default()));

    let handle = fetch(
        &session(100),
        Arc::new(CouponsRequest::new(api.clone())),
        targets.clone(),
        RetryPolicy::default(),
        collecting(&collected),
    )
    .expect("worker starts");

    // When: The user pauses while target 3 is in flight, then stops
    assert!(api.wait_for_calls(3, Duration::from_secs(5)));
    handle.pause();
    api.release();
    assert!(handle.control().wait_until_parked(Duration::from_secs(5)));
    let exit = handle.stop();

    // Then: Exactly the first three targets produced results
    assert_eq!(exit, WorkerExit::Interrupted { processed: 3 });
    let collected = collected.borrow();
    assert_eq!(collected.results.len(), 3);
    assert!(collected.logs.len() <= 3, "logs: {:?}", collected.logs);

    // And: No request was ever issued for targets 4 to 10
    assert_eq!(api.calls(), targets[..3].to_vec());
}

#[test]
fn when_worker_is_paused_and_resumed_system_processes_every_target_once() {
    // Given: A running worker whose second request is held
    let api = Arc::new(ScriptedApi::new());
    api.hold_call(2);
    let targets = uids(5);
    let collected = Rc::new(RefCell::new(Collected::default()));
    let handle = fetch(
        &session(100),
        Arc::new(CouponsRequest::new(api.clone())),
        targets.clone(),
        RetryPolicy::no_retry(),
        collecting(&collected),
    )
    .expect("worker starts");

    // When: It is paused, parks at the barrier and is resumed
    assert!(api.wait_for_calls(2, Duration::from_secs(5)));
    handle.pause();
    api.release();
    assert!(handle.control().wait_until_parked(Duration::from_secs(5)));
    assert_eq!(api.calls().len(), 2);
    handle.resume();
    let exit = handle.wait();

    // Then: Every target is requested exactly once, in order
    assert_eq!(exit, WorkerExit::Completed { processed: 5, failed: 0 });
    assert_eq!(api.calls(), targets);
    let uids_seen: Vec<InstrumentUid> = collected.borrow().results.iter().map(|r| r.uid).collect();
    assert_eq!(uids_seen, targets);
}

// =============================================================================
// Fetch Pipeline: Failures
// =============================================================================

#[test]
fn when_request_fails_transiently_system_retries_and_moves_on() {
    // Given: The second bond fails once before succeeding
    let api = Arc::new(ScriptedApi::new());
    let targets = uids(3);
    api.fail_times(targets[1], 1);
    let collected = Rc::new(RefCell::new(Collected::default()));

    // When: The batch is fetched with two retries
    let exit = fetch(
        &session(100),
        Arc::new(CouponsRequest::new(api.clone())),
        targets.clone(),
        RetryPolicy::immediate(2),
        collecting(&collected),
    )
    .expect("worker starts")
    .wait();

    // Then: The failed target is retried and the batch completes
    assert_eq!(exit, WorkerExit::Completed { processed: 3, failed: 0 });
    assert_eq!(api.calls(), vec![targets[0], targets[1], targets[1], targets[2]]);

    // And: The failure log names the target and attempt
    let collected = collected.borrow();
    assert_eq!(collected.results.len(), 3);
    assert!(collected
        .logs
        .iter()
        .any(|line| line.contains(&targets[1].to_string()) && line.contains("attempt 1/3")));
}

#[test]
fn when_request_keeps_failing_system_skips_target_but_progress_still_advances() {
    // Given: The first bond never succeeds
    let api = Arc::new(ScriptedApi::new());
    let targets = uids(3);
    api.fail_times(targets[0], 100);
    let collected = Rc::new(RefCell::new(Collected::default()));

    // When: The batch is fetched with one retry
    let exit = fetch(
        &session(100),
        Arc::new(CouponsRequest::new(api.clone())),
        targets.clone(),
        RetryPolicy::immediate(1),
        collecting(&collected),
    )
    .expect("worker starts")
    .wait();

    // Then: The target is skipped after two attempts and the others succeed
    assert_eq!(exit, WorkerExit::Completed { processed: 3, failed: 1 });
    assert_eq!(api.calls().len(), 4);

    // And: Progress reached the end, one step per target
    let collected = collected.borrow();
    assert_eq!(collected.results.len(), 2);
    assert_eq!(
        collected.progress,
        vec![Progress::new(1, 3), Progress::new(2, 3), Progress::new(3, 3)]
    );
}

#[test]
fn when_method_has_no_rate_limit_system_aborts_the_whole_batch() {
    // Given: A token whose quota table lacks the coupon method
    let api = Arc::new(ScriptedApi::new());
    let session = TokenSession::new(
        Token::new("t.partial").expect("token"),
        vec![RateLimit::per_minute(Method::GetCandles.as_str(), 10).expect("limit")],
    );
    let collected = Rc::new(RefCell::new(Collected::default()));

    // When: Coupons are fetched
    let exit = fetch(
        &session,
        Arc::new(CouponsRequest::new(api.clone())),
        uids(4),
        RetryPolicy::default(),
        collecting(&collected),
    )
    .expect("worker starts")
    .wait();

    // Then: Nothing is requested and the diagnostic names the method
    assert_eq!(
        exit,
        WorkerExit::Aborted(FetchError::RateLimitUnconfigured {
            method: String::from("InstrumentsService/GetBondCoupons")
        })
    );
    assert!(api.calls().is_empty());
    assert!(collected
        .borrow()
        .logs
        .iter()
        .any(|line| line.contains("rate limit not found for method 'InstrumentsService/GetBondCoupons'")));
}

#[test]
fn when_api_does_not_support_a_method_system_skips_targets_without_retrying() {
    // Given: An API without forecast support
    let api = Arc::new(ScriptedApi::new());
    let session = TokenSession::new(Token::new("t").expect("token"), default_rate_limits());

    // When: Forecasts are fetched
    let exit = fetch(
        &session,
        Arc::new(ForecastRequest::new(api.clone())),
        uids(2),
        RetryPolicy::immediate(3),
        FetchCallbacks::new(),
    )
    .expect("worker starts")
    .wait();

    // Then: Each target is skipped once and the API is never called
    assert_eq!(exit, WorkerExit::Completed { processed: 2, failed: 2 });
    assert!(api.calls().is_empty());
}

// =============================================================================
// Fetch Pipeline: Shared Quota
// =============================================================================

#[test]
fn when_two_workers_share_a_token_system_meters_them_against_one_quota() {
    // Given: A token allowing three coupon requests per minute
    let api = Arc::new(ScriptedApi::new());
    let session = session(3);

    // When: A first worker spends the whole quota
    let first = fetch(
        &session,
        Arc::new(CouponsRequest::new(api.clone())),
        uids(3),
        RetryPolicy::no_retry(),
        FetchCallbacks::new(),
    )
    .expect("worker starts")
    .wait();
    assert_eq!(first, WorkerExit::Completed { processed: 3, failed: 0 });

    // And: A second worker on the same token starts
    let second = fetch(
        &session,
        Arc::new(CouponsRequest::new(api.clone())),
        uids(2),
        RetryPolicy::no_retry(),
        FetchCallbacks::new(),
    )
    .expect("worker starts");

    // Then: It blocks at the limiter without calling the API
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(api.calls().len(), 3);

    // And: Stopping it interrupts the blocked acquire
    assert_eq!(second.stop(), WorkerExit::Interrupted { processed: 0 });
    assert_eq!(api.calls().len(), 3);
}

#[test]
fn when_last_prices_are_fetched_system_delivers_them_through_pump() {
    // Given: A last-price request for two instruments
    let api = Arc::new(ScriptedApi::new());
    let prices = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&prices);
    let mut handle = fetch(
        &session(10),
        Arc::new(LastPriceRequest::new(api.clone())),
        uids(2),
        RetryPolicy::no_retry(),
        FetchCallbacks::new().on_result(move |price: LastPrice| sink.borrow_mut().push(price)),
    )
    .expect("worker starts");

    // When: The controlling thread pumps until the worker finishes
    assert!(eventually(Duration::from_secs(5), || handle.pump().is_some()));

    // Then: Both prices arrived on this thread
    assert_eq!(prices.borrow().len(), 2);
    assert!(prices.borrow().iter().all(|price| price.price == Some(rub("985.50"))));
    assert_eq!(handle.progress(), Progress::new(2, 2));
}
