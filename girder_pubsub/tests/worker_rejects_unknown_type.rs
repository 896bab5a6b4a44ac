mod common;

use common::{Greeting, mem_broker};
use girder_pubsub::{BoxError, Message, PubClient, ReceivedMessage, SubClient, TaskHandler, Worker};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Counter(Arc<AtomicUsize>);

#[async_trait::async_trait]
impl TaskHandler<Greeting> for Counter {
    async fn handle_task(&self, _: Greeting, message: &ReceivedMessage) -> Result<(), BoxError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        message.ack().await?;

        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_stops_on_message_of_unknown_type() {
    // Given
    let broker = mem_broker("worker-unknown-type");
    let publisher = PubClient::open(&broker).await.unwrap();
    publisher
        .send(Message::new("not a task").with_metadata("type", "Event"))
        .await
        .unwrap();
    let handled = Arc::new(AtomicUsize::new(0));
    let worker = Worker::new(broker.clone(), Counter(handled.clone()))
        .with_receive_timeout(Duration::from_millis(50))
        .with_shutdown_timeout(Duration::from_secs(5));

    // When
    let result = worker.run().await;

    // Then
    assert_eq!(
        result.err().map(|error| error.to_string()),
        Some("message has unknown type".to_string()),
    );
    assert_eq!(handled.load(Ordering::SeqCst), 0);

    // And the message is back on the queue
    let subscriber = SubClient::open(&broker).await.unwrap();
    let redelivered = subscriber.receive().await.unwrap();
    assert_eq!(redelivered.body, b"not a task".to_vec());
}
