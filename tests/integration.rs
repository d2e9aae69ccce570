use std::{collections::BTreeSet, ops::Deref, sync::Arc, time::Duration};

use msg_processor::{
    config::Config,
    message::{MessageStatistics, MessageStatus},
    queue::EventQueue,
    service::Service,
    store::MessageStore,
    worker::{DrainWorker, TickOutcome},
};
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct TmpService {
    svc: Service,
    #[allow(unused)]
    tmpdir: TempDir,
}

impl Deref for TmpService {
    type Target = Service;

    fn deref(&self) -> &Self::Target {
        &self.svc
    }
}

async fn setup() -> TmpService {
    let path = tempfile::tempdir().unwrap();

    let config = Config {
        db_path: Some(path.path().join("store.db").to_string_lossy().to_string()),
        queue_path: Some(path.path().join("queue.db").to_string_lossy().to_string()),
        queue_poll_interval_ms: Some(5),
        ..Config::default()
    };

    TmpService {
        svc: Service::connect_with(&config).await.unwrap(),
        tmpdir: path,
    }
}

fn worker(service: &Service) -> DrainWorker {
    DrainWorker::from_service(service, Duration::from_millis(400))
}

#[tokio::test]
async fn test_submit_and_drain() {
    let service = setup().await;

    let message = service.submit("hello").await.unwrap();
    assert_eq!(message.status, MessageStatus::Processing);
    assert_eq!(message.text, "hello");

    assert_eq!(
        service.statistics().await.unwrap(),
        MessageStatistics {
            processing: 1,
            completed: 0
        }
    );

    let outcome = worker(&service)
        .tick(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TickOutcome::Completed {
            events: 1,
            ids: 1,
            updated: 1
        }
    );

    assert_eq!(
        service.statistics().await.unwrap(),
        MessageStatistics {
            processing: 0,
            completed: 1
        }
    );

    let stored = service.get_message(message.id).await.unwrap();
    assert_eq!(stored.status, MessageStatus::Completed);
    assert!(stored.updated_at >= message.updated_at);
}

#[tokio::test]
async fn test_ids_unique_across_submissions() {
    let service = setup().await;

    let mut ids = BTreeSet::new();
    for i in 0..10 {
        ids.insert(service.submit(&format!("message {i}")).await.unwrap().id);
    }

    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn test_idle_tick_skips() {
    let service = setup().await;

    let outcome = worker(&service)
        .tick(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, TickOutcome::Skipped);
}

#[tokio::test]
async fn test_concurrent_submissions_all_complete() {
    let service = Arc::new(setup().await);

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.submit(&format!("concurrent {i}")).await.unwrap().id
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 16);

    worker(&service)
        .tick(&CancellationToken::new())
        .await
        .unwrap();

    let stats = service.statistics().await.unwrap();
    assert_eq!(stats.processing + stats.completed, 16);
    assert_eq!(stats.completed, 16);
}

#[tokio::test]
async fn test_completed_never_regresses() {
    let service = setup().await;

    let message = service.submit("hello").await.unwrap();
    worker(&service)
        .tick(&CancellationToken::new())
        .await
        .unwrap();

    let updated = service
        .store()
        .update_status(&BTreeSet::from([message.id]), MessageStatus::Processing)
        .await
        .unwrap();

    assert_eq!(updated, 0);
    assert_eq!(
        service.get_message(message.id).await.unwrap().status,
        MessageStatus::Completed
    );
}

#[tokio::test]
async fn test_queue_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        db_path: Some(dir.path().join("store.db").to_string_lossy().to_string()),
        queue_path: Some(dir.path().join("queue.db").to_string_lossy().to_string()),
        queue_poll_interval_ms: Some(5),
        ..Config::default()
    };

    let message = {
        let service = Service::connect_with(&config).await.unwrap();
        service.submit("persisted").await.unwrap()
    };

    let service = Service::connect_with(&config).await.unwrap();
    let event = service
        .queue()
        .consume_one(
            Instant::now() + Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(event.decode_message().unwrap().id, message.id);
}

#[tokio::test]
async fn test_missing_message_not_found() {
    let service = setup().await;

    let err = service.get_message(404).await.unwrap_err();

    assert!(matches!(
        err,
        msg_processor::error::Error::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_close_releases_store_and_queue() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        db_path: Some(dir.path().join("store.db").to_string_lossy().to_string()),
        queue_path: Some(dir.path().join("queue.db").to_string_lossy().to_string()),
        ..Config::default()
    };

    let service = Service::connect_with(&config).await.unwrap();
    let message = service.submit("kept").await.unwrap();

    service.close().await;
    assert!(service.submit("dropped").await.is_err());

    let reopened = Service::connect_with(&config).await.unwrap();
    assert_eq!(
        reopened.get_message(message.id).await.unwrap().status,
        MessageStatus::Processing
    );
}
