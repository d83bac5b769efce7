//! Outbound calls.
//!
//! Connects to a configured node and runs an originating session.

use std::time::Duration;

use log::{info, warn};

use crate::config::{BinkConfig, ConfigError};
use crate::core::{BinkpResult, InboundSink};
use crate::session::{Session, SessionConfig, SessionReport};
use crate::transfer::OutboundQueue;
use crate::transport::Transport;

/// Result of a call, with the queue and sink handed back.
///
/// The queue holds whatever the remote did not acknowledge, so the caller
/// can keep it for the next attempt even when the call failed.
#[derive(Debug)]
pub struct CallOutcome<K> {
    /// Session result.
    pub result: BinkpResult<SessionReport>,
    /// Unacknowledged and skipped items.
    pub queue: OutboundQueue,
    /// Inbound sink.
    pub sink: K,
}

/// Call `host:port` and run an originating session.
pub async fn call_host<K>(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    config: SessionConfig,
    queue: OutboundQueue,
    sink: K,
) -> CallOutcome<K>
where
    K: InboundSink,
{
    info!("calling {}:{}", host, port);
    let transport = match Transport::connect(host, port, connect_timeout).await {
        Ok(transport) => transport,
        Err(e) => {
            warn!("call to {}:{} failed: {}", host, port, e);
            return CallOutcome {
                result: Err(e.into()),
                queue,
                sink,
            };
        }
    };

    let mut session = Session::new(transport, config, queue, sink);
    let result = session.run().await;
    let (queue, sink) = session.into_parts();
    CallOutcome {
        result,
        queue,
        sink,
    }
}

/// Call the node configured for `address`.
pub async fn call<K>(
    config: &BinkConfig,
    address: &str,
    queue: OutboundQueue,
    sink: K,
) -> CallOutcome<K>
where
    K: InboundSink,
{
    let target = config.callout(address).map(|c| (c.host.clone(), c.port()));
    let (Some((host, port)), Ok(session)) = (target, config.session_for_callout(address)) else {
        return CallOutcome {
            result: Err(ConfigError::UnknownNode(address.to_string()).into()),
            queue,
            sink,
        };
    };
    call_host(
        &host,
        port,
        config.binkp.connect_timeout(),
        session,
        queue,
        sink,
    )
    .await
}
