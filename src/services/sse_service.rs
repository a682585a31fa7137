use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::state::hub::Subscription;

/// Convert a dashboard subscription into an SSE response, forwarding events and
/// unsubscribing once the client disconnects.
pub fn to_sse_stream(
    mut subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from the subscription and pushes into mpsc
    tokio::spawn(async move {
        let subscriber = subscription.id();
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                received = subscription.recv() => {
                    let Some(payload) = received else { break };
                    let mut event = Event::default().data(payload.data);
                    if let Some(name) = payload.event {
                        event = event.event(name);
                    }

                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }

        // The subscription drops here, removing it from the hub.
        tracing::info!(subscriber, "dashboard SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
