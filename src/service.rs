//! Server-side RPC dispatch.
//!
//! A service binds one retrieval scheme to one database replica and answers
//! `DatabaseInfo` and `Query` requests; nothing is kept between requests.

use crate::database::Info;
use crate::messages::{self, Request, Response, Scheme, SchemeError};
use crate::server::{PirServer, Server};

/// One replica's RPC endpoint, enumerated by scheme.
pub enum Service {
    VpirIt(Server),
    VpirDpf(Server),
    PirClassic(PirServer),
    PirMerkle(PirServer),
}

impl Service {
    pub fn scheme(&self) -> Scheme {
        match self {
            Service::VpirIt(_) => Scheme::VpirIt,
            Service::VpirDpf(_) => Scheme::VpirDpf,
            Service::PirClassic(_) => Scheme::PirClassic,
            Service::PirMerkle(_) => Scheme::PirMerkle,
        }
    }

    pub fn info(&self) -> &Info {
        match self {
            Service::VpirIt(server) | Service::VpirDpf(server) => server.db_info(),
            Service::PirClassic(server) | Service::PirMerkle(server) => server.db_info(),
        }
    }

    /// Answer one request. Failures become `Response::Error` so a bad query
    /// never tears down the connection.
    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::DatabaseInfo => Response::DatabaseInfo(self.info().clone()),
            Request::Query(bytes) => match self.answer_bytes(&bytes) {
                Ok(answer) => Response::Answer(answer),
                Err(e) => {
                    log::warn!("query failed: {}", e);
                    Response::Error(e.to_string())
                }
            },
        }
    }

    /// Decode the query per this service's scheme, answer, encode.
    pub fn answer_bytes(&self, query: &[u8]) -> Result<Vec<u8>, SchemeError> {
        match self {
            Service::VpirIt(server) => {
                let q = messages::decode_elements(query)?;
                Ok(messages::encode_elements(&server.answer(&q)?))
            }
            Service::VpirDpf(server) => {
                let key = messages::decode_dpf_key(query)?;
                Ok(messages::encode_elements(&server.answer_dpf(&key)?))
            }
            Service::PirClassic(server) | Service::PirMerkle(server) => server.answer(query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ItClient, PirClient};
    use crate::database::{BytesDb, Db};
    use crate::xof::Xof;

    #[test]
    fn test_database_info_request() {
        let mut xof = Xof::keyed(b"db key");
        let db = Db::random(&mut xof, 1 << 12, 1, 2);
        let info = db.info.clone();
        let service = Service::VpirIt(Server::new(db));
        assert_eq!(service.scheme(), Scheme::VpirIt);
        match service.handle(Request::DatabaseInfo) {
            Response::DatabaseInfo(got) => assert_eq!(got, info),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_vpir_it_query_dispatch() {
        let mut xof = Xof::keyed(b"db key");
        let db = Db::random(&mut xof, 1 << 12, 1, 2);
        let info = db.info.clone();
        let block = db.block(1).to_vec();
        let service = Service::VpirIt(Server::new(db));

        let mut client = ItClient::new(Xof::keyed(b"my key"), info);
        let queries = client.query_bytes(1, 2).unwrap();
        let answers: Vec<Vec<u8>> = queries
            .iter()
            .map(|q| match service.handle(Request::Query(q.clone())) {
                Response::Answer(a) => a,
                other => panic!("unexpected response: {:?}", other),
            })
            .collect();
        assert_eq!(client.reconstruct_bytes(&answers).unwrap(), block);
    }

    #[test]
    fn test_pir_classic_query_dispatch() {
        let mut xof = Xof::keyed(b"db key");
        let db = BytesDb::random(&mut xof, 1 << 12, 1, 8).unwrap();
        let info = db.info.clone();
        let block = db.block(3).to_vec();
        let service = Service::PirClassic(PirServer::new(db));

        let mut client = PirClient::new(Xof::stream(&[9u8; 16]), info);
        let queries = client.query(3, 2).unwrap();
        let answers: Vec<Vec<u8>> = queries
            .iter()
            .map(|q| match service.handle(Request::Query(q.clone())) {
                Response::Answer(a) => a,
                other => panic!("unexpected response: {:?}", other),
            })
            .collect();
        assert_eq!(client.reconstruct(&answers).unwrap(), block);
    }

    #[test]
    fn test_malformed_query_becomes_error_response() {
        let mut xof = Xof::keyed(b"db key");
        let db = Db::random(&mut xof, 1 << 12, 1, 2);
        let service = Service::VpirIt(Server::new(db));
        match service.handle(Request::Query(vec![1, 2, 3])) {
            Response::Error(_) => {}
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
