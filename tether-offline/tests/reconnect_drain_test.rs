//! Monitor transitions driving queue drains

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tether_config::QueueConfig;
use tether_http::HttpRequest;
use tether_offline::{
    ConnectivityEvent, ConnectivityMonitor, DrainReport, OfflineRequestQueue, QueuedRequest,
    ReplayError, RequestReplayer,
};
use tokio::sync::mpsc;

#[derive(Default)]
struct CountingReplayer {
    replayed: Mutex<Vec<String>>,
}

#[async_trait]
impl RequestReplayer for CountingReplayer {
    async fn replay(&self, request: &QueuedRequest) -> Result<(), ReplayError> {
        self.replayed.lock().push(request.url.clone());
        Ok(())
    }
}

fn wire_drain_on_online(
    monitor: &ConnectivityMonitor,
    queue: Arc<OfflineRequestQueue>,
    replayer: Arc<CountingReplayer>,
) -> (tether_offline::Subscription, mpsc::UnboundedReceiver<Option<DrainReport>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = monitor.add_listener(move |event, _| {
        if event == ConnectivityEvent::Online {
            let queue = queue.clone();
            let replayer = replayer.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let report = queue.drain(replayer.as_ref()).await;
                let _ = tx.send(report);
            });
        }
    });
    (subscription, rx)
}

#[tokio::test(start_paused = true)]
async fn test_online_transition_drains_queue() {
    let monitor = ConnectivityMonitor::new(true);
    let queue = Arc::new(OfflineRequestQueue::new(&QueueConfig::default()));
    let replayer = Arc::new(CountingReplayer::default());
    let (_subscription, mut reports) = wire_drain_on_online(&monitor, queue.clone(), replayer.clone());

    monitor.handle_event(ConnectivityEvent::Offline);
    for n in 0..5 {
        queue.enqueue("workflow", HttpRequest::get(format!("http://api/workflows/{n}")));
    }
    assert_eq!(queue.len(), 5);

    monitor.handle_event(ConnectivityEvent::Online);
    let report = reports.recv().await.unwrap().unwrap();

    assert_eq!(report.succeeded, 5);
    assert_eq!(report.remaining, 0);
    assert!(queue.is_empty());
    assert_eq!(replayer.replayed.lock().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_flapping_connectivity_runs_one_drain_at_a_time() {
    let monitor = ConnectivityMonitor::new(false);
    let queue = Arc::new(OfflineRequestQueue::new(&QueueConfig {
        replay_delay: Duration::from_secs(1),
        ..QueueConfig::default()
    }));
    let replayer = Arc::new(CountingReplayer::default());
    let (_subscription, mut reports) = wire_drain_on_online(&monitor, queue.clone(), replayer.clone());

    for n in 0..3 {
        queue.enqueue("query", HttpRequest::get(format!("http://api/queries/{n}")));
    }

    monitor.handle_event(ConnectivityEvent::Online);
    tokio::task::yield_now().await;
    monitor.handle_event(ConnectivityEvent::Offline);
    monitor.handle_event(ConnectivityEvent::Online);

    let first = reports.recv().await.unwrap();
    let second = reports.recv().await.unwrap();

    // Exactly one of the two passes did the work
    let completed: Vec<DrainReport> = [first, second].into_iter().flatten().collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].succeeded, 3);
    assert_eq!(replayer.replayed.lock().len(), 3);
}
