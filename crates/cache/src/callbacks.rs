#[cfg(test)]
#[path = "tests/callbacks.rs"]
mod tests;

use std::time::Instant;

use tracing::{debug, error, info};
use xds_snapshot_primitives::discovery::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use xds_snapshot_primitives::node::Node;
use xds_snapshot_primitives::stream::{StreamId, StreamKind};

use crate::cache::SnapshotCache;
use crate::dispatch::SnapshotStore;
use crate::errors::CacheError;

/// Hooks the discovery transport invokes over a stream's lifetime, one per
/// event, for both protocol variants.
///
/// Hooks may be called concurrently from any number of stream tasks. An `Err`
/// from a request hook means the transport should terminate that stream.
pub trait Callbacks: Send + Sync {
    fn on_stream_open(&self, stream_id: StreamId, type_url: &str) -> Result<(), CacheError>;

    fn on_stream_closed(&self, stream_id: StreamId, node: Option<&Node>);

    fn on_stream_request(
        &self,
        stream_id: StreamId,
        request: &DiscoveryRequest,
    ) -> Result<(), CacheError>;

    fn on_stream_response(
        &self,
        stream_id: StreamId,
        request: &DiscoveryRequest,
        response: &DiscoveryResponse,
    );

    fn on_delta_stream_open(&self, stream_id: StreamId, type_url: &str) -> Result<(), CacheError>;

    fn on_delta_stream_closed(&self, stream_id: StreamId, node: Option<&Node>);

    /// Stamps `request.sequence`; the same request must be handed to
    /// [`Callbacks::on_stream_delta_response`] for its timing to be recorded.
    fn on_stream_delta_request(
        &self,
        stream_id: StreamId,
        request: &mut DeltaDiscoveryRequest,
    ) -> Result<(), CacheError>;

    fn on_stream_delta_response(
        &self,
        stream_id: StreamId,
        request: &DeltaDiscoveryRequest,
        response: &DeltaDiscoveryResponse,
    );

    fn on_fetch_request(&self, request: &DiscoveryRequest) -> Result<(), CacheError>;

    fn on_fetch_response(&self, request: &DiscoveryRequest, response: &DiscoveryResponse);
}

impl<S: SnapshotStore> Callbacks for SnapshotCache<S> {
    fn on_stream_open(&self, stream_id: StreamId, type_url: &str) -> Result<(), CacheError> {
        self.open_stream(StreamKind::StateOfTheWorld, stream_id, type_url)
    }

    fn on_stream_closed(&self, stream_id: StreamId, node: Option<&Node>) {
        self.close_stream(StreamKind::StateOfTheWorld, stream_id, node);
    }

    fn on_stream_request(
        &self,
        stream_id: StreamId,
        request: &DiscoveryRequest,
    ) -> Result<(), CacheError> {
        let begin = Instant::now();

        info!(
            %stream_id,
            version_info = %request.version_info,
            response_nonce = %request.response_nonce,
            resource_names = ?request.resource_names,
            type_url = %request.type_url,
            "Handling xDS resource request"
        );

        let summary =
            self.handle_request(StreamKind::StateOfTheWorld, stream_id, request, begin)?;

        info!(
            %stream_id,
            version_info = %request.version_info,
            response_nonce = %request.response_nonce,
            node_id = %summary.node_id,
            node_version = %summary.node_version,
            resource_names = ?request.resource_names,
            type_url = %request.type_url,
            assignment = ?summary.assignment,
            error_code = summary.error_code,
            error_message = %summary.error_message,
            lock_duration = ?summary.lock_duration,
            finish_duration = ?summary.finish_duration,
            "Handled xDS resource request"
        );

        Ok(())
    }

    fn on_stream_response(
        &self,
        stream_id: StreamId,
        _request: &DiscoveryRequest,
        response: &DiscoveryResponse,
    ) {
        match self.lookup_node(StreamKind::StateOfTheWorld, stream_id) {
            Some(node) => debug!(
                %stream_id,
                node_id = %node.id,
                version_info = %response.version_info,
                nonce = %response.nonce,
                type_url = %response.type_url,
                "Sending response"
            ),
            None => error!(%stream_id, "Tried to send a response to a node we haven't seen yet"),
        }
    }

    fn on_delta_stream_open(&self, stream_id: StreamId, type_url: &str) -> Result<(), CacheError> {
        self.open_stream(StreamKind::Incremental, stream_id, type_url)
    }

    fn on_delta_stream_closed(&self, stream_id: StreamId, node: Option<&Node>) {
        self.close_stream(StreamKind::Incremental, stream_id, node);
    }

    fn on_stream_delta_request(
        &self,
        stream_id: StreamId,
        request: &mut DeltaDiscoveryRequest,
    ) -> Result<(), CacheError> {
        let begin = Instant::now();
        let sequence = self.correlator.begin(stream_id, begin);
        request.sequence = Some(sequence);

        info!(
            %stream_id,
            %sequence,
            subscribe = ?request.resource_names_subscribe,
            unsubscribe = ?request.resource_names_unsubscribe,
            type_url = %request.type_url,
            "Handling xDS delta resource request"
        );

        let summary = self.handle_request(StreamKind::Incremental, stream_id, &*request, begin)?;

        debug!(
            %stream_id,
            %sequence,
            response_nonce = %request.response_nonce,
            node_id = %summary.node_id,
            node_version = %summary.node_version,
            subscribe = ?request.resource_names_subscribe,
            unsubscribe = ?request.resource_names_unsubscribe,
            type_url = %request.type_url,
            assignment = ?summary.assignment,
            error_code = summary.error_code,
            error_message = %summary.error_message,
            lock_duration = ?summary.lock_duration,
            finish_duration = ?summary.finish_duration,
            "Handled xDS delta resource request"
        );

        Ok(())
    }

    fn on_stream_delta_response(
        &self,
        stream_id: StreamId,
        request: &DeltaDiscoveryRequest,
        response: &DeltaDiscoveryResponse,
    ) {
        let elapsed = request
            .sequence
            .and_then(|sequence| self.correlator.end(stream_id, sequence, Instant::now()));

        // Read without mutation; the stream may be closing concurrently.
        let node = self.lookup_node(StreamKind::Incremental, stream_id);
        let node_id = node.as_ref().map_or("", |node| node.id.as_str());

        match elapsed {
            Some(duration) => {
                self.metrics
                    .record_delta_response_duration(stream_id, node_id, duration);
                info!(
                    %stream_id,
                    sequence = ?request.sequence,
                    subscribe = ?request.resource_names_subscribe,
                    unsubscribe = ?request.resource_names_unsubscribe,
                    type_url = %request.type_url,
                    ?duration,
                    "Handled xDS delta resource response"
                );
            }
            None => error!(
                %stream_id,
                sequence = ?request.sequence,
                type_url = %request.type_url,
                "xDS delta response without a matching request"
            ),
        }

        if node.is_some() {
            debug!(
                %stream_id,
                node_id,
                system_version_info = %response.system_version_info,
                nonce = %response.nonce,
                "Sending incremental response"
            );
        } else {
            error!(%stream_id, "Tried to send a response to a node we haven't seen yet");
        }
    }

    fn on_fetch_request(&self, _request: &DiscoveryRequest) -> Result<(), CacheError> {
        Ok(())
    }

    fn on_fetch_response(&self, _request: &DiscoveryRequest, _response: &DiscoveryResponse) {}
}
