use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use streamrelay::{
    Backend, MemoryBackend, Publisher, Subscriber, SubscriberConfig, SubscriberError,
};
use tokio::time::{sleep, timeout, Instant};

fn setup(
    idle_tick: Duration,
    buffer_capacity: usize,
) -> (Arc<Subscriber>, Publisher) {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::default());
    let publisher = Publisher::default();
    publisher.initialize(Arc::clone(&backend));
    let sub = Subscriber::with_config(
        backend,
        "c",
        "u-s",
        SubscriberConfig {
            idle_tick,
            buffer_capacity,
            ..SubscriberConfig::default()
        },
    );
    (Arc::new(sub), publisher)
}

/// Тест проверяет, что close из другой задачи завершает ожидающую
/// итерацию не позже одного тика.
#[tokio::test]
async fn test_concurrent_close_ends_iteration() {
    let (sub, _) = setup(Duration::from_millis(100), 16);
    sub.start().await.unwrap();
    let mut stream = sub.stream().unwrap();

    let closer = Arc::clone(&sub);
    tokio::spawn(async move {
        sleep(Duration::from_millis(30)).await;
        closer.close().await.unwrap();
    });

    let started = Instant::now();
    let item = timeout(Duration::from_secs(2), stream.next()).await.unwrap();
    assert!(item.is_none());
    assert!(started.elapsed() < Duration::from_secs(1));
}

/// Тест проверяет, что буферизованные до close конверты выдаются, а затем
/// поток завершается.
#[tokio::test]
async fn test_close_drains_buffer() {
    let (sub, publisher) = setup(Duration::from_millis(50), 16);
    sub.start().await.unwrap();
    for d in ["a", "b"] {
        publisher.publish("c", "u-s", d).await.unwrap();
    }
    sleep(Duration::from_millis(100)).await;
    sub.close().await.unwrap();

    let data: Vec<String> = sub
        .stream()
        .unwrap()
        .into_stream()
        .map(|item| item.unwrap().data)
        .collect()
        .await;
    assert_eq!(data, vec!["a", "b"]);
}

/// Тест проверяет вытеснение старейших конвертов при переполнении буфера.
#[tokio::test]
async fn test_overflow_drops_oldest() {
    let (sub, publisher) = setup(Duration::from_millis(50), 2);
    sub.start().await.unwrap();
    for d in ["1", "2", "3", "4"] {
        publisher.publish("c", "u-s", d).await.unwrap();
    }
    sleep(Duration::from_millis(100)).await;

    assert_eq!(sub.stats().overflowed, 2);
    let mut stream = sub.stream().unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap().data, "3");
    assert_eq!(stream.next().await.unwrap().unwrap().data, "4");
}

#[tokio::test]
async fn test_second_stream_rejected() {
    let (sub, _) = setup(Duration::from_millis(50), 4);
    let _stream = sub.stream().unwrap();
    assert_eq!(sub.stream().unwrap_err(), SubscriberError::StreamTaken);
}

/// Тест проверяет, что брошенный поток отсоединяет pull-путь, а push-путь
/// продолжает работать.
#[tokio::test]
async fn test_dropped_stream_detaches_pull_path() {
    let (sub, publisher) = setup(Duration::from_millis(50), 4);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    sub.register_handler(move |env| {
        let _ = tx.send(env.data.clone());
    });
    sub.start().await.unwrap();
    drop(sub.stream().unwrap());

    publisher.publish("c", "u-s", "push only").await.unwrap();
    let got = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(got.as_deref(), Some("push only"));
    assert_eq!(sub.stats().delivered, 1);
}
