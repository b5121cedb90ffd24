//! Client-side orchestration of the server replicas.
//!
//! Every retrieval needs all replicas: queries fan out in parallel and the
//! answers fan back in ordered by server, so answer `k` always matches the
//! share built for server `k`. Any transport failure aborts the whole call.

use crate::database::Info;
use crate::messages::{Request, Response, TransportError};
use crate::transport::{FramedIo, Transport};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The set of server replicas a client talks to.
#[derive(Debug)]
pub struct Cluster {
    addresses: Vec<String>,
    timeout: Duration,
}

impl Cluster {
    pub fn new(addresses: Vec<String>) -> Result<Cluster, TransportError> {
        Cluster::with_timeout(addresses, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        addresses: Vec<String>,
        timeout: Duration,
    ) -> Result<Cluster, TransportError> {
        if addresses.is_empty() {
            return Err(TransportError::InvalidArgument("no server addresses".into()));
        }
        Ok(Cluster { addresses, timeout })
    }

    pub fn num_servers(&self) -> usize {
        self.addresses.len()
    }

    /// Fetch the database info from every replica; all must agree on the
    /// geometry before any retrieval starts.
    pub fn database_info(&self) -> Result<Info, TransportError> {
        let requests = vec![Request::DatabaseInfo; self.addresses.len()];
        let responses = self.fan_out(&requests)?;
        let mut infos = Vec::with_capacity(responses.len());
        for response in responses {
            match response {
                Response::DatabaseInfo(info) => infos.push(info),
                Response::Error(msg) => return Err(TransportError::Server(msg)),
                Response::Answer(_) => {
                    return Err(TransportError::Decode("answer to an info request".into()))
                }
            }
        }
        if infos.iter().any(|info| !info.same_geometry(&infos[0])) {
            return Err(TransportError::InfoMismatch);
        }
        log::debug!(
            "negotiated database info: {}x{} blocks of {}",
            infos[0].num_rows,
            infos[0].num_columns,
            infos[0].block_size
        );
        Ok(infos.remove(0))
    }

    /// Send one query per replica and collect the answers in server order.
    pub fn submit(&self, queries: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, TransportError> {
        if queries.len() != self.addresses.len() {
            return Err(TransportError::InvalidArgument(format!(
                "{} queries for {} servers",
                queries.len(),
                self.addresses.len()
            )));
        }
        let requests: Vec<Request> =
            queries.iter().map(|q| Request::Query(q.clone())).collect();
        let responses = self.fan_out(&requests)?;
        responses
            .into_iter()
            .map(|response| match response {
                Response::Answer(bytes) => Ok(bytes),
                Response::Error(msg) => Err(TransportError::Server(msg)),
                Response::DatabaseInfo(_) => {
                    Err(TransportError::Decode("info in answer position".into()))
                }
            })
            .collect()
    }

    fn fan_out(&self, requests: &[Request]) -> Result<Vec<Response>, TransportError> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .addresses
                .iter()
                .zip(requests.iter())
                .map(|(address, request)| scope.spawn(move || self.call(address, request)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| TransportError::Io("request worker panicked".into()))?
                })
                .collect()
        })
    }

    // One request/response exchange on a fresh connection.
    fn call(&self, address: &str, request: &Request) -> Result<Response, TransportError> {
        let sock_addr = address
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect(address.to_string(), e.to_string()))?
            .next()
            .ok_or_else(|| {
                TransportError::Connect(address.to_string(), "no resolved address".into())
            })?;
        let stream = TcpStream::connect_timeout(&sock_addr, self.timeout)
            .map_err(|e| TransportError::Connect(address.to_string(), e.to_string()))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let mut io = FramedIo::new(stream);
        io.send(request)?;
        io.recv()
    }
}
