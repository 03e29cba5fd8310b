use std::{convert::Infallible, time::Duration};

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;

use crate::dto::sse::ServerEvent;

/// Capacity of the channel between a view task and its HTTP response.
pub const VIEW_CHANNEL_CAPACITY: usize = 16;

/// Render a [`ServerEvent`] as an SSE frame.
fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Turn the receiving half of a view channel into an SSE response.
///
/// When the client disconnects axum drops the stream, which drops `receiver`; the producing
/// task observes that through `Sender::closed` and tears itself down.
pub fn to_sse_stream(
    mut receiver: mpsc::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream! {
        while let Some(payload) = receiver.recv().await {
            yield Ok(to_event(payload));
        }
    };

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
