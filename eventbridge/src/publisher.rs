//! Publishing domain events to the event log.

use crate::codec::encode;
use crate::event::DomainEvent;
use crate::monitoring::{BridgeFailure, Diagnostics};
use crate::transport::{ExpectedVersion, Transport};
use crate::types::{EventId, StreamId};
use std::sync::Arc;
use tracing::{error, field, instrument, Span};

/// What happened to a publish call.
///
/// Publishing never fails from the caller's point of view; the outcome exists
/// for observability only and is not a durability guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum PublishOutcome {
    /// There was no event to publish; the transport was not called.
    Skipped,
    /// The event was appended.
    Appended {
        /// Stream the event was appended to
        stream: StreamId,
        /// Identifier minted for the event
        event_id: EventId,
    },
    /// Encoding or appending failed. The failure was logged and reported.
    Failed {
        /// Stream the event was meant for
        stream: StreamId,
        /// Why it failed
        reason: String,
    },
}

impl PublishOutcome {
    /// Whether the event reached the transport successfully.
    pub const fn is_appended(&self) -> bool {
        matches!(self, Self::Appended { .. })
    }
}

/// Appends domain events with "any version" concurrency.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    feature_stream: StreamId,
    diagnostics: Diagnostics,
}

impl Publisher {
    /// Publishes to `feature_stream` unless a stream is given per call.
    pub fn new(
        transport: Arc<dyn Transport>,
        feature_stream: StreamId,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            transport,
            feature_stream,
            diagnostics,
        }
    }

    /// The default target stream.
    pub const fn feature_stream(&self) -> &StreamId {
        &self.feature_stream
    }

    /// Encodes `event` and appends it to `stream`, or to the feature stream.
    ///
    /// `None`, or an event that serializes to JSON `null`, is skipped without
    /// touching the transport.
    #[instrument(skip_all, fields(stream = field::Empty, event_type = field::Empty))]
    pub async fn publish<T>(&self, event: Option<&T>, stream: Option<&StreamId>) -> PublishOutcome
    where
        T: DomainEvent + ?Sized,
    {
        let Some(event) = event else {
            return PublishOutcome::Skipped;
        };
        let target = stream.unwrap_or(&self.feature_stream).clone();
        let span = Span::current();
        span.record("stream", field::display(&target));
        span.record("event_type", event.event_type());

        let data = match encode(event) {
            Ok(Some(data)) => data,
            Ok(None) => return PublishOutcome::Skipped,
            Err(err) => return self.failed(target, err.to_string()),
        };
        let event_id = data.event_id;

        match self
            .transport
            .append_to_stream(&target, ExpectedVersion::Any, vec![data])
            .await
        {
            Ok(()) => {
                self.diagnostics.published();
                PublishOutcome::Appended {
                    stream: target,
                    event_id,
                }
            }
            Err(err) => self.failed(target, err.to_string()),
        }
    }

    fn failed(&self, stream: StreamId, reason: String) -> PublishOutcome {
        error!("Failed to publish event to stream {stream}: {reason}");
        self.diagnostics.report(BridgeFailure::Publish {
            stream: stream.clone(),
            reason: reason.clone(),
        });
        PublishOutcome::Failed { stream, reason }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("feature_stream", &self.feature_stream)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;
    use crate::errors::{TransportError, TransportResult};
    use crate::event::EventData;
    use crate::subscription::SubscriptionSink;
    use crate::transport::TransportSubscription;
    use crate::types::{EventNumber, GroupName};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::Serialize;
    use tracing_test::traced_test;

    #[derive(Serialize)]
    struct OrderPlaced {
        order: u32,
    }

    impl DomainEvent for OrderPlaced {
        fn event_type(&self) -> &str {
            "OrderPlaced"
        }
    }

    #[derive(Serialize)]
    struct Absent;

    impl DomainEvent for Absent {
        fn event_type(&self) -> &str {
            "Absent"
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        fail: bool,
        appends: Mutex<Vec<(StreamId, ExpectedVersion, Vec<EventData>)>>,
    }

    #[async_trait]
    impl crate::transport::Transport for RecordingTransport {
        async fn connect(&self, _settings: &ConnectionSettings) -> TransportResult<()> {
            Ok(())
        }

        async fn append_to_stream(
            &self,
            stream: &StreamId,
            expected_version: ExpectedVersion,
            events: Vec<EventData>,
        ) -> TransportResult<()> {
            if self.fail {
                return Err(TransportError::AppendFailed {
                    stream: stream.clone(),
                    reason: "disk full".into(),
                });
            }
            self.appends
                .lock()
                .push((stream.clone(), expected_version, events));
            Ok(())
        }

        async fn subscribe_to_stream_from(
            &self,
            _stream: &StreamId,
            _checkpoint: Option<EventNumber>,
            _resolve_link_tos: bool,
            _sink: SubscriptionSink,
        ) -> TransportResult<Box<dyn TransportSubscription>> {
            Err(TransportError::NotConnected)
        }

        async fn subscribe_to_stream(
            &self,
            _stream: &StreamId,
            _resolve_link_tos: bool,
            _sink: SubscriptionSink,
        ) -> TransportResult<Box<dyn TransportSubscription>> {
            Err(TransportError::NotConnected)
        }

        async fn connect_to_persistent_subscription(
            &self,
            _stream: &StreamId,
            _group: &GroupName,
            _sink: SubscriptionSink,
        ) -> TransportResult<Box<dyn TransportSubscription>> {
            Err(TransportError::NotConnected)
        }

        async fn close(&self) -> TransportResult<()> {
            Ok(())
        }
    }

    fn stream(name: &str) -> StreamId {
        StreamId::try_new(name).unwrap()
    }

    fn publisher(transport: &Arc<RecordingTransport>) -> (Publisher, Diagnostics) {
        let diagnostics = Diagnostics::new();
        let publisher = Publisher::new(
            Arc::clone(transport) as Arc<dyn Transport>,
            stream("features"),
            diagnostics.clone(),
        );
        (publisher, diagnostics)
    }

    #[tokio::test]
    async fn publishing_nothing_is_a_no_op() {
        let transport = Arc::new(RecordingTransport::default());
        let (publisher, _) = publisher(&transport);

        let outcome = publisher.publish::<OrderPlaced>(None, None).await;
        assert_eq!(outcome, PublishOutcome::Skipped);

        let outcome = publisher.publish(Some(&Absent), None).await;
        assert_eq!(outcome, PublishOutcome::Skipped);

        assert!(transport.appends.lock().is_empty());
    }

    #[tokio::test]
    async fn routes_to_feature_stream_by_default() {
        let transport = Arc::new(RecordingTransport::default());
        let (publisher, diagnostics) = publisher(&transport);

        let outcome = publisher.publish(Some(&OrderPlaced { order: 1 }), None).await;

        let appends = transport.appends.lock();
        assert_eq!(appends.len(), 1);
        let (target, expected, events) = &appends[0];
        assert_eq!(target.as_ref(), "features");
        assert_eq!(*expected, ExpectedVersion::Any);
        assert_eq!(events[0].event_type, "OrderPlaced");
        assert!(events[0].metadata.is_none());
        assert_eq!(
            outcome,
            PublishOutcome::Appended {
                stream: stream("features"),
                event_id: events[0].event_id
            }
        );
        assert_eq!(diagnostics.metrics().events_published.get(), 1);
    }

    #[tokio::test]
    async fn explicit_stream_wins() {
        let transport = Arc::new(RecordingTransport::default());
        let (publisher, _) = publisher(&transport);

        let outcome = publisher
            .publish(Some(&OrderPlaced { order: 2 }), Some(&stream("orders-2")))
            .await;

        assert!(outcome.is_appended());
        assert_eq!(transport.appends.lock()[0].0.as_ref(), "orders-2");
    }

    #[tokio::test]
    #[traced_test]
    async fn transport_failures_are_swallowed_and_reported() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        });
        let (publisher, diagnostics) = publisher(&transport);
        let mut failures = diagnostics.subscribe();

        let outcome = publisher.publish(Some(&OrderPlaced { order: 3 }), None).await;

        assert!(matches!(outcome, PublishOutcome::Failed { ref stream, .. } if stream.as_ref() == "features"));
        assert_eq!(diagnostics.metrics().publish_failures.get(), 1);
        assert!(matches!(
            failures.try_recv().unwrap(),
            BridgeFailure::Publish { .. }
        ));
        assert!(logs_contain("Failed to publish event to stream features"));
    }
}
