mod common;

use common::{Greeting, mem_broker};
use girder_core::AppContext;
use girder_pubsub::{BoxError, PubClient, ReceivedMessage, TaskHandler, Worker};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

struct Greeter {
    seen: Arc<Mutex<Vec<String>>>,
    expected: usize,
}

#[async_trait::async_trait]
impl TaskHandler<Greeting> for Greeter {
    async fn handle_task(&self, task: Greeting, message: &ReceivedMessage) -> Result<(), BoxError> {
        message.ack().await?;

        let count = {
            let mut seen = self.seen.lock();
            seen.push(task.name);
            seen.len()
        };

        if count == self.expected {
            AppContext::terminate();
        }

        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_processes_tasks_until_terminated() {
    // Given
    let broker = mem_broker("worker-greetings");
    let publisher = PubClient::open(&broker).await.unwrap();
    for name in ["ada", "grace"] {
        publisher
            .send_task(&Greeting {
                name: name.to_string(),
            })
            .await
            .unwrap();
    }
    let seen = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let worker = Worker::new(
        broker,
        Greeter {
            seen: seen.clone(),
            expected: 2,
        },
    )
    .with_receive_timeout(Duration::from_millis(50))
    .with_shutdown_timeout(Duration::from_secs(5))
    .with_close_fn({
        let closed = closed.clone();
        move || async move {
            closed.store(true, Ordering::SeqCst);
            Ok::<(), BoxError>(())
        }
    });

    // When
    let result = worker.run().await;

    // Then
    assert!(result.is_ok());
    assert_eq!(*seen.lock(), vec!["ada".to_string(), "grace".to_string()]);
    assert!(closed.load(Ordering::SeqCst));
}
