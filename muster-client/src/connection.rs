// Copyright ⓒ 2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::net::SocketAddr;

use bytes::Bytes;
use muster_wire::{
    Request,
    frame::{self, SIZE_PREFIX},
};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{TcpStream, lookup_host},
};
use tracing::{Instrument, Level, debug, error, span};
use url::Url;

use crate::{Error, Result};

/// A broker connection with a correlation id
#[derive(Debug)]
pub struct Connection {
    broker: Url,
    stream: TcpStream,
    correlation_id: i32,
    client_id: Option<String>,
}

impl Connection {
    pub async fn connect(broker: &Url, client_id: Option<String>) -> Result<Self> {
        debug!(%broker);

        TcpStream::connect(host_port(broker).await?)
            .await
            .inspect_err(|err| error!(%broker, ?err))
            .map(|stream| Self {
                broker: broker.clone(),
                stream,
                correlation_id: 0,
                client_id,
            })
            .map_err(Into::into)
    }

    pub fn broker(&self) -> &Url {
        &self.broker
    }

    /// Send a request to the broker and wait for its response
    pub async fn call<Q>(&mut self, request: &Q) -> Result<Q::Response>
    where
        Q: Request,
    {
        let local = self.stream.local_addr()?;
        let peer = self.stream.peer_addr()?;
        let span = span!(Level::DEBUG, "call", %local, %peer, api_key = Q::KEY);

        async move {
            let correlation_id = self.correlation_id;
            self.correlation_id = self.correlation_id.wrapping_add(1);

            debug!(correlation_id, ?request);

            let encoded = frame::request(correlation_id, self.client_id.clone(), request)?;
            self.stream.write_all(&encoded[..]).await?;

            self.read_frame()
                .await
                .and_then(|frame| frame::response::<Q>(correlation_id, frame).map_err(Into::into))
                .inspect(|response| debug!(?response))
        }
        .instrument(span)
        .await
    }

    async fn read_frame(&mut self) -> Result<Bytes> {
        let mut size = [0u8; SIZE_PREFIX];
        _ = self.stream.read_exact(&mut size).await?;

        let mut buffer = vec![0u8; frame::frame_length(size)?];
        _ = self.stream.read_exact(&mut buffer[..]).await?;

        Ok(Bytes::from(buffer))
    }
}

/// Resolve the host of a broker url into a socket address
async fn host_port(broker: &Url) -> Result<SocketAddr> {
    if let Some(host) = broker.host_str()
        && let Some(port) = broker.port()
    {
        let mut addresses = lookup_host(format!("{host}:{port}"))
            .await?
            .filter(|socket_addr| matches!(socket_addr, SocketAddr::V4(_)));

        if let Some(socket_addr) = addresses.next().inspect(|socket_addr| debug!(?socket_addr)) {
            return Ok(socket_addr);
        }
    }

    Err(Error::UnknownHost(broker.clone()))
}
