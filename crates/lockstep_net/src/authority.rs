//! Authority election
//!
//! First process to bind the configured port becomes the Host; anyone who
//! finds it taken becomes a Client of the Host at the configured address.
//! There is no further leader election: two processes racing at startup can
//! both observe a free port only if the platform allows shared binds.

use crate::port::{PortError, Transport};
use crate::{NetConfig, Role};
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("could not host ({bind}) nor reach a host at {addr}")]
    Unreachable {
        addr: SocketAddr,
        bind: PortError,
        #[source]
        source: PortError,
    },
}

/// Outcome of the election: the role and the port opened for it.
#[derive(Debug)]
pub struct Negotiated<P> {
    pub role: Role,
    pub port: P,
}

/// Bind-or-connect on `config.port`.
pub fn negotiate<T: Transport>(
    transport: &T,
    config: &NetConfig,
) -> Result<Negotiated<T::Port>, NegotiationError> {
    let listen = SocketAddr::new(config.bind_address, config.port);
    let bind = match transport.bind(listen) {
        Ok(port) => {
            tracing::info!("host mode on :{}", config.port);
            return Ok(Negotiated {
                role: Role::Host,
                port,
            });
        }
        Err(e) => e,
    };

    tracing::debug!("bind failed, falling back to client: {}", bind);
    let host = SocketAddr::new(config.host_address, config.port);
    match transport.connect(host) {
        Ok(port) => {
            tracing::info!("client mode -> {}", host);
            Ok(Negotiated {
                role: Role::Client,
                port,
            })
        }
        Err(source) => Err(NegotiationError::Unreachable {
            addr: host,
            bind,
            source,
        }),
    }
}
