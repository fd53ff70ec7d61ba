#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use promise_aplus::{Error, Handler, Promise, PromiseState, Queue, Resolution};
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Barrier, Mutex,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn test_chain_across_threads() {
        let queue = Queue::serial().name("chain").spawn().expect("spawn queue");
        let promise = Promise::<i32, Error>::new(&queue);
        let producer = promise.clone();

        let tail = promise
            .then(Some(Handler::value(|v| Ok(v + 1))), None)
            .chain(Handler::value(|v: i32| Ok(v.to_string())), None);

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer.resolve(41).unwrap();
        });

        assert_eq!(block_on(tail.settled()), Ok("42".to_string()));
    }

    #[test]
    fn test_handler_returning_promise_resolved_later() {
        let queue = Queue::serial().name("adopt").spawn().expect("spawn queue");
        let promise = Promise::<i32, Error>::new(&queue);
        let inner = Promise::<i32, Error>::new(&queue);
        let returned = inner.clone();

        let child = promise.then(Some(Handler::adopt(move |_| Ok(returned))), None);
        promise.resolve(1).unwrap();

        let late = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            inner.resolve(99).unwrap();
        });
        assert_eq!(block_on(child.settled()), Ok(99));
        late.join().expect("The resolving thread has panicked");
    }

    #[test]
    fn test_registration_order_with_concurrent_settlement() {
        let queue = Queue::serial().name("ordering").spawn().expect("spawn queue");
        let promise = Promise::<usize, Error>::new(&queue);
        let order = Arc::new(Mutex::new(Vec::new()));

        let children: Vec<_> = (0..32)
            .map(|i| {
                let order = order.clone();
                promise.then(
                    Some(Handler::value(move |v| {
                        order.lock().unwrap().push(i);
                        Ok(v)
                    })),
                    None,
                )
            })
            .collect();

        let producer = promise.clone();
        thread::spawn(move || producer.resolve(7))
            .join()
            .expect("The producer thread has panicked")
            .unwrap();

        let values = block_on(Promise::all(&queue, children).settled()).unwrap();
        assert_eq!(values, vec![7; 32]);
        assert_eq!(*order.lock().unwrap(), (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_registrars_racing_the_producer_each_run_once() {
        const REGISTRARS: usize = 8;
        const PER_THREAD: usize = 16;
        let queue = Queue::serial().name("register-race").spawn().expect("spawn queue");
        let promise = Promise::<usize, Error>::new(&queue);
        let counts: Arc<Vec<AtomicUsize>> =
            Arc::new((0..REGISTRARS * PER_THREAD).map(|_| AtomicUsize::new(0)).collect());
        let barrier = Arc::new(Barrier::new(REGISTRARS + 1));

        let registrars: Vec<_> = (0..REGISTRARS)
            .map(|t| {
                let (promise, counts, barrier) = (promise.clone(), counts.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    (0..PER_THREAD)
                        .map(|j| {
                            let (index, counts) = (t * PER_THREAD + j, counts.clone());
                            promise.then(
                                Some(Handler::value(move |v| {
                                    counts[index].fetch_add(1, Ordering::SeqCst);
                                    Ok(v + index)
                                })),
                                None,
                            )
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let producer = {
            let (promise, barrier) = (promise.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                promise.resolve(1000)
            })
        };

        producer
            .join()
            .expect("The producer thread has panicked")
            .unwrap();
        let children: Vec<_> = registrars
            .into_iter()
            .flat_map(|task| task.join().expect("The registrar thread has panicked"))
            .collect();

        let values = block_on(Promise::all(&queue, children).settled()).unwrap();
        assert_eq!(values, (0..REGISTRARS * PER_THREAD).map(|i| 1000 + i).collect::<Vec<_>>());
        assert!(counts.iter().all(|count| count.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_racing_producers_settle_once() {
        let queue = Queue::serial().name("race").spawn().expect("spawn queue");
        let promise = Promise::<usize, Error>::new(&queue);
        let barrier = Arc::new(Barrier::new(4));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let promise = promise.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        promise.resolve(i)
                    } else {
                        promise.reject(Error::Reason(format!("producer {i}")))
                    }
                })
            })
            .collect();
        let wins = tasks
            .into_iter()
            .map(|task| task.join().expect("The producer thread has panicked"))
            .filter(Result::is_ok)
            .count();

        assert_eq!(wins, 1);
        assert_ne!(promise.state(), PromiseState::Pending);
        let first = block_on(promise.settled());
        assert_eq!(block_on(promise.settled()), first);
    }

    #[test]
    fn test_when_with_mixed_inputs_across_threads() {
        let queue = Queue::serial().name("when").spawn().expect("spawn queue");
        let (a, b) = (
            Promise::<i32, Error>::new(&queue),
            Promise::<i32, Error>::new(&queue),
        );
        let all = Promise::when(
            &queue,
            vec![
                Resolution::adopt(a.clone()),
                Resolution::Value(2),
                Resolution::adopt(b.clone()),
            ],
        );
        let tb = thread::spawn(move || b.resolve(3));
        let ta = thread::spawn(move || a.resolve(1));
        tb.join().expect("The b thread has panicked").unwrap();
        ta.join().expect("The a thread has panicked").unwrap();
        assert_eq!(block_on(all.settled()), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_when_rejects_with_first_reason() {
        let queue = Queue::serial().name("when-reject").spawn().expect("spawn queue");
        let (a, b) = (
            Promise::<i32, Error>::new(&queue),
            Promise::<i32, Error>::new(&queue),
        );
        let all = Promise::all(&queue, vec![a.clone(), b.clone()]);
        b.reject("E".into()).unwrap();
        assert_eq!(block_on(all.settled()), Err(Error::from("E")));
        a.resolve(1).unwrap();
        assert_eq!(block_on(a.settled()), Ok(1));
        assert_eq!(all.reason(), Some(Error::from("E")));
    }

    #[test]
    fn test_promise_into_future() {
        let queue = Queue::main();
        let promise = Promise::<&'static str, Error>::resolved(&queue, "done");
        let outcome = block_on(async move { promise.await });
        assert_eq!(outcome, Ok("done"));
    }
}
