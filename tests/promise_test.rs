use futures::executor::block_on;
use promise_kit::{pair, poly, then, CancelToken, Error, Promise};
use std::thread;

#[test]
fn pair_hands_the_value_to_the_first_reader() {
    let (promise, consumer) = pair::Producer::<String>::new();
    let token = CancelToken::new();

    let reader = {
        let token = token.clone();
        thread::spawn(move || {
            let first = block_on(consumer.wait(&token));
            let second = block_on(consumer.wait(&token));
            (first, second)
        })
    };
    promise.resolve("payload".into());

    let (first, second) = reader.join().unwrap();
    assert_eq!(first.unwrap(), "payload");
    assert!(matches!(second, Err(Error::NoResult)));
}

#[test]
fn poly_serves_unlimited_readers() {
    let (promise, consumer) = poly::Producer::<i32>::new();
    let token = CancelToken::new();

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let consumer = consumer.clone();
            let token = token.clone();
            thread::spawn(move || block_on(consumer.wait(&token)))
        })
        .collect();
    promise.resolve(11);

    for reader in readers {
        assert_eq!(reader.join().unwrap().unwrap(), 11);
    }
    // Late and repeated reads keep returning the cached result.
    assert_eq!(consumer.try_get().unwrap(), 11);
    assert_eq!(block_on(consumer.wait(&token)).unwrap(), 11);
}

#[test]
fn spawn_runs_the_work_off_thread() {
    let caller = thread::current().id();
    let consumer = poly::Producer::spawn(move || {
        assert_ne!(thread::current().id(), caller);
        Ok(5)
    });
    assert_eq!(block_on(consumer).unwrap(), 5);
}

#[test]
fn spawn_surfaces_the_work_failure() {
    let consumer = pair::Producer::<i32>::spawn(|| Err("connection refused".into()));
    let result = block_on(consumer);
    assert!(matches!(result, Err(Error::Failed(e)) if e.to_string() == "connection refused"));
}

#[test]
fn complete_with_resolves_or_rejects() {
    let (promise, consumer) = poly::Producer::<i32>::new();
    promise.complete_with(|| Ok(2));
    assert_eq!(consumer.try_get().unwrap(), 2);

    let (promise, consumer) = poly::Producer::<i32>::new();
    promise.complete_with(|| Err("no quorum".into()));
    assert!(matches!(consumer.try_get(), Err(Error::Failed(_))));
}

#[test]
fn memoized_work_feeds_a_transform_chain() {
    let source = pair::Producer::spawn(|| Ok(6));
    let memo = source.memoize();
    let token = CancelToken::new();
    let base = block_on(memo.wait(&token)).unwrap();

    let (promise, consumer) = poly::Producer::<i32>::new();
    let chained = then::transform(&consumer, move |value| Ok(value + base));
    promise.resolve(1);
    assert_eq!(block_on(chained).unwrap(), 7);
}
