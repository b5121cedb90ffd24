use clap::Parser;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use vpir::database::{BytesDb, Db};
use vpir::merkle;
use vpir::messages::{Request, Scheme, TransportError};
use vpir::persist;
use vpir::server::{PirServer, Server};
use vpir::service::Service;
use vpir::transport::{FramedIo, Transport};
use vpir::xof::Xof;

#[derive(Parser)]
struct Args {
    /// Retrieval scheme: pir-classic, pir-merkle, vpir-it or vpir-dpf.
    #[arg(long, default_value = "vpir-it")]
    scheme: String,
    #[arg(long, default_value = "127.0.0.1:4000")]
    listen: String,
    /// Persisted element database; a random one is synthesized when absent.
    #[arg(long)]
    db: Option<String>,
    /// Seed for database synthesis; replicas must share it.
    #[arg(long, default_value = "db key")]
    seed: String,
    #[arg(long, default_value = "1048576")]
    db_len_bits: usize,
    #[arg(long, default_value = "1")]
    num_rows: usize,
    #[arg(long, default_value = "16")]
    block_size: usize,
    /// Re-balance a vector element database into a square matrix.
    #[arg(long)]
    matrix: bool,
}

fn build_service(args: &Args) -> Result<Service, Box<dyn std::error::Error>> {
    let scheme = Scheme::parse(&args.scheme)
        .ok_or_else(|| format!("unknown scheme: {}", args.scheme))?;
    match scheme {
        Scheme::VpirIt | Scheme::VpirDpf => {
            let mut db = match &args.db {
                Some(path) => persist::load(Path::new(path))?,
                None => {
                    let mut xof = Xof::keyed(args.seed.as_bytes());
                    Db::random(&mut xof, args.db_len_bits, args.num_rows, args.block_size)
                }
            };
            if args.matrix {
                db = db.rebalance()?;
            }
            let server = Server::new(db);
            Ok(if scheme == Scheme::VpirIt {
                Service::VpirIt(server)
            } else {
                Service::VpirDpf(server)
            })
        }
        Scheme::PirClassic => {
            let mut xof = Xof::keyed(args.seed.as_bytes());
            let db = BytesDb::random(&mut xof, args.db_len_bits, args.num_rows, args.block_size)?;
            Ok(Service::PirClassic(PirServer::new(db)))
        }
        Scheme::PirMerkle => {
            let mut xof = Xof::keyed(args.seed.as_bytes());
            let plain =
                BytesDb::random(&mut xof, args.db_len_bits, args.num_rows, args.block_size)?;
            let db = merkle::augment(&plain)?;
            Ok(Service::PirMerkle(PirServer::new(db)))
        }
    }
}

fn handle_client(stream: TcpStream, service: Arc<Service>) -> Result<(), TransportError> {
    let mut io = FramedIo::new(stream);
    loop {
        let request: Request = io.recv()?;
        io.send(&service.handle(request))?;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let service = Arc::new(build_service(&args)?);
    let info = service.info();
    println!(
        "serving {} on {}: {}x{} blocks of {}",
        service.scheme().as_str(),
        args.listen,
        info.num_rows,
        info.num_columns,
        info.block_size
    );

    let listener = TcpListener::bind(&args.listen)?;
    for stream in listener.incoming() {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            if let Ok(stream) = stream {
                if let Err(e) = handle_client(stream, service) {
                    log::debug!("connection closed: {}", e);
                }
            }
        });
    }
    Ok(())
}
