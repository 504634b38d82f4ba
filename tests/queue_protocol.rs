use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use relayq::{MemoryStore, PollStrategy, Queue, QueueError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Task {
    id: u64,
    command: String,
    args: Vec<String>,
}

fn task(id: u64) -> Task {
    Task {
        id,
        command: "convert".to_string(),
        args: vec![format!("in-{}.png", id), format!("out-{}.jpg", id)],
    }
}

/// Two handles on one store behave like two processes sharing a Redis server.
async fn shared_queue(name: &str) -> (Queue, Queue) {
    let store = Arc::new(MemoryStore::new());
    let producer = Queue::builder()
        .name(name)
        .store(store.clone())
        .poll_strategy(PollStrategy::Fixed(Duration::from_millis(10)))
        .build()
        .await
        .unwrap();
    let consumer = Queue::builder()
        .name(name)
        .store(store)
        .poll_strategy(PollStrategy::Fixed(Duration::from_millis(10)))
        .build()
        .await
        .unwrap();
    (producer, consumer)
}

#[tokio::test]
async fn push_then_pop_round_trips() {
    let (producer, consumer) = shared_queue("roundtrip").await;

    producer.push(&task(1)).await.unwrap();
    producer.push("message").await.unwrap();

    assert_eq!(consumer.pop::<Task>().await.unwrap(), Some(task(1)));
    assert_eq!(
        consumer.pop::<String>().await.unwrap().as_deref(),
        Some("message")
    );
}

#[tokio::test]
async fn inbox_grows_with_pushes_and_counter_tracks_them() {
    let (queue, _) = shared_queue("lengths").await;
    let inbox_start = queue.inbox_length().await.unwrap();
    let counter_start = queue.pushed_total().await.unwrap();

    for id in 0..5 {
        queue.push(&task(id)).await.unwrap();
    }

    assert_eq!(queue.inbox_length().await.unwrap(), inbox_start + 5);
    assert_eq!(queue.pushed_total().await.unwrap(), counter_start + 5);
}

#[tokio::test]
async fn pop_moves_exactly_one_element() {
    let (queue, _) = shared_queue("move").await;
    queue.push(&task(1)).await.unwrap();
    queue.push(&task(2)).await.unwrap();

    let inbox_before = queue.inbox_length().await.unwrap();
    let outbox_before = queue.outbox_length().await.unwrap();

    let popped: Option<Task> = queue.pop().await.unwrap();
    assert!(popped.is_some());

    assert_eq!(queue.inbox_length().await.unwrap(), inbox_before - 1);
    assert_eq!(queue.outbox_length().await.unwrap(), outbox_before + 1);
    // Pops never touch the counter.
    assert_eq!(queue.pushed_total().await.unwrap(), 2);
}

#[tokio::test]
async fn elements_come_out_in_push_order() {
    let (producer, consumer) = shared_queue("fifo").await;
    producer.push("A").await.unwrap();
    producer.push("B").await.unwrap();
    producer.push("C").await.unwrap();

    let mut order = Vec::new();
    while let Some(value) = consumer.pop::<String>().await.unwrap() {
        order.push(value);
    }
    assert_eq!(order, ["A", "B", "C"]);
}

#[tokio::test]
async fn empty_pop_leaves_destination_unchanged() {
    let (queue, _) = shared_queue("empty").await;

    let mut destination = task(42);
    let found = queue.pop_into(&mut destination).await.unwrap();

    assert!(!found);
    assert_eq!(destination, task(42));
    assert_eq!(queue.pop::<Task>().await.unwrap(), None);
    assert_eq!(queue.outbox_length().await.unwrap(), 0);
}

#[tokio::test]
async fn pop_into_overwrites_destination_when_found() {
    let (queue, _) = shared_queue("dest").await;
    queue.push(&task(7)).await.unwrap();

    let mut destination = task(0);
    assert!(queue.pop_into(&mut destination).await.unwrap());
    assert_eq!(destination, task(7));
}

#[tokio::test]
async fn blocking_pop_receives_later_push() {
    let (producer, consumer) = shared_queue("handoff").await;

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        producer.push("message").await.unwrap();
    });

    let received: String = consumer.bpop().await.unwrap();
    assert_eq!(received, "message");
    assert_eq!(consumer.inbox_length().await.unwrap(), 0);
    assert_eq!(consumer.outbox_length().await.unwrap(), 1);
}

#[tokio::test]
async fn blocking_pop_returns_immediately_when_element_waits() {
    let (queue, _) = shared_queue("ready").await;
    queue.push(&task(3)).await.unwrap();

    let received: Task = tokio::time::timeout(Duration::from_secs(1), queue.bpop())
        .await
        .expect("element was already waiting")
        .unwrap();
    assert_eq!(received, task(3));
}

#[tokio::test]
async fn blocking_pop_times_out_on_empty_queue() {
    let (queue, _) = shared_queue("timeout").await;

    let received: Option<Task> = queue
        .bpop_timeout(Duration::from_millis(80))
        .await
        .unwrap();
    assert_eq!(received, None);

    // The abandoned loop must not swallow a later push.
    queue.push(&task(5)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.inbox_length().await.unwrap(), 1);
    assert_eq!(queue.pop::<Task>().await.unwrap(), Some(task(5)));
}

async fn timeout_on_single_thread(poll: PollStrategy) -> Option<Task> {
    let queue = Queue::builder()
        .name("tight")
        .store(Arc::new(MemoryStore::new()))
        .poll_strategy(poll)
        .build()
        .await
        .unwrap();
    tokio::time::timeout(
        Duration::from_secs(2),
        queue.bpop_timeout::<Task>(Duration::from_millis(50)),
    )
    .await
    .expect("poll loop starved the runtime")
    .unwrap()
}

#[tokio::test(flavor = "current_thread")]
async fn tight_fixed_interval_still_times_out() {
    let received = timeout_on_single_thread(PollStrategy::Fixed(Duration::from_millis(1))).await;
    assert_eq!(received, None);
}

#[tokio::test(flavor = "current_thread")]
async fn tight_backoff_still_times_out() {
    let received = timeout_on_single_thread(PollStrategy::Backoff {
        base: Duration::from_millis(1),
        max: Duration::from_millis(20),
    })
    .await;
    assert_eq!(received, None);
}

#[tokio::test(flavor = "current_thread")]
async fn tight_native_block_still_times_out() {
    let received = timeout_on_single_thread(PollStrategy::Native {
        block: Duration::from_micros(1),
    })
    .await;
    assert_eq!(received, None);
}

#[tokio::test]
async fn blocking_pop_can_be_cancelled() {
    let (queue, _) = shared_queue("cancel").await;
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move {
            queue
                .bpop_until::<Task, _>(async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    stop_tx.send(()).unwrap();

    assert_eq!(waiter.await.unwrap().unwrap(), None);
    assert_eq!(queue.outbox_length().await.unwrap(), 0);
}

#[tokio::test]
async fn racing_pops_deliver_single_element_once() {
    let (producer, consumer) = shared_queue("race-pop").await;
    producer.push(&task(1)).await.unwrap();

    let (a, b) = tokio::join!(producer.pop::<Task>(), consumer.pop::<Task>());
    let delivered: Vec<Task> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();

    assert_eq!(delivered, vec![task(1)]);
}

#[tokio::test]
async fn racing_blocking_pops_deliver_single_element_once() {
    let (producer, consumer) = shared_queue("race-bpop").await;
    let other = consumer.clone();

    let first = tokio::spawn(async move {
        consumer
            .bpop_timeout::<Task>(Duration::from_millis(400))
            .await
    });
    let second =
        tokio::spawn(async move { other.bpop_timeout::<Task>(Duration::from_millis(400)).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    producer.push(&task(9)).await.unwrap();

    let results = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
    let delivered: Vec<Task> = results.into_iter().flatten().collect();

    assert_eq!(delivered, vec![task(9)]);
    assert_eq!(producer.inbox_length().await.unwrap(), 0);
    assert_eq!(producer.outbox_length().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_and_consumers_lose_nothing() {
    const PRODUCERS: u64 = 8;
    const PER_PRODUCER: u64 = 25;
    const TOTAL: u64 = PRODUCERS * PER_PRODUCER;

    let (producer, consumer) = shared_queue("stress").await;

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let queue = producer.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                queue.push(&task(p * PER_PRODUCER + i)).await.unwrap();
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..4 {
        let queue = consumer.clone();
        consumers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(t) = queue
                .bpop_timeout::<Task>(Duration::from_millis(300))
                .await
                .unwrap()
            {
                seen.push(t.id);
            }
            seen
        }));
    }

    for handle in producers {
        handle.await.unwrap();
    }
    let mut all = Vec::new();
    for handle in consumers {
        all.extend(handle.await.unwrap());
    }

    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(all.len() as u64, TOTAL, "every element delivered exactly once");
    assert_eq!(unique.len() as u64, TOTAL);
    assert_eq!(producer.pushed_total().await.unwrap(), TOTAL as i64);
    assert_eq!(producer.inbox_length().await.unwrap(), 0);
    assert_eq!(producer.outbox_length().await.unwrap(), TOTAL as i64);
}

#[tokio::test]
async fn native_strategy_hands_off() {
    let store = Arc::new(MemoryStore::new());
    let consumer = Queue::builder()
        .name("native")
        .store(store.clone())
        .poll_strategy(PollStrategy::Native {
            block: Duration::from_millis(50),
        })
        .build()
        .await
        .unwrap();
    let producer = Queue::with_store("native", store).await.unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        producer.push(&task(11)).await.unwrap();
    });

    let received: Task = consumer.bpop().await.unwrap();
    assert_eq!(received, task(11));
}

#[tokio::test]
async fn message_stream_yields_in_order() {
    let (producer, consumer) = shared_queue("stream").await;
    for id in 0..3 {
        producer.push(&task(id)).await.unwrap();
    }

    let ids: Vec<u64> = consumer
        .messages::<Task>()
        .take(3)
        .map(|t| t.unwrap().id)
        .collect()
        .await;
    assert_eq!(ids, vec![0, 1, 2]);
}

#[tokio::test]
async fn message_stream_ends_after_error() {
    let (producer, consumer) = shared_queue("stream-err").await;
    producer.push("not a task").await.unwrap();
    producer.push(&task(1)).await.unwrap();

    let items: Vec<_> = consumer.messages::<Task>().collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(QueueError::Deserialization(_))));
}

#[tokio::test]
async fn queues_on_one_store_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let emails = Queue::with_store("emails", store.clone()).await.unwrap();
    let thumbs = Queue::with_store("thumbs", store).await.unwrap();

    emails.push("welcome").await.unwrap();

    assert_eq!(thumbs.pop::<String>().await.unwrap(), None);
    assert_eq!(thumbs.pushed_total().await.unwrap(), 0);
    assert_eq!(
        emails.pop::<String>().await.unwrap().as_deref(),
        Some("welcome")
    );
}
