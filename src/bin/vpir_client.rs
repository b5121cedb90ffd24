use clap::Parser;
use rand::Rng;
use std::path::Path;
use vpir::client::{DpfClient, ItClient, PirClient};
use vpir::cluster::Cluster;
use vpir::config::{load_config, CONFIG_ENV};
use vpir::database::{hash_to_index, Info};
use vpir::messages::Scheme;
use vpir::xof::Xof;

#[derive(Parser)]
struct Args {
    /// Retrieval scheme: pir-classic, pir-merkle, vpir-it or vpir-dpf.
    #[arg(long, default_value = "vpir-it")]
    scheme: String,
    /// Experiment repetitions.
    #[arg(long, default_value = "1")]
    repetitions: usize,
    /// Number of bits to retrieve per repetition.
    #[arg(long, default_value = "128")]
    bits_to_retrieve: usize,
    /// Bit size of the element in which the block length is specified.
    #[arg(long, default_value = "8")]
    elem_bit_size: usize,
    /// Identifier to retrieve; a random start block is picked when empty.
    #[arg(long, default_value = "")]
    id: String,
    /// Config file path; falls back to the CONFIG environment variable.
    #[arg(long)]
    config: Option<String>,
    /// Query-randomness key; drawn fresh when empty.
    #[arg(long, default_value = "")]
    key: String,
}

// Number of database blocks covering the requested bit count.
fn blocks_for_bits(info: &Info, elem_bit_size: usize, num_bits: usize) -> usize {
    let block_bits = info.user_block_size().max(1) * elem_bit_size.max(1);
    num_bits.div_ceil(block_bits).max(1)
}

fn query_xof(key: &str) -> Xof {
    if key.is_empty() {
        let seed: [u8; 32] = rand::thread_rng().gen();
        Xof::keyed(&seed)
    } else {
        Xof::keyed(key.as_bytes())
    }
}

enum Client {
    It(ItClient),
    Dpf(DpfClient),
    Pir(PirClient),
}

impl Client {
    fn retrieve(
        &mut self,
        cluster: &Cluster,
        index: usize,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        let num_servers = cluster.num_servers();
        match self {
            Client::It(client) => {
                let queries = client.query_bytes(index, num_servers)?;
                let answers = cluster.submit(&queries)?;
                Ok(client.reconstruct_bytes(&answers)?.len())
            }
            Client::Dpf(client) => {
                let queries = client.query_bytes(index, num_servers)?;
                let answers = cluster.submit(&queries)?;
                Ok(client.reconstruct_bytes(&answers)?.len())
            }
            Client::Pir(client) => {
                let queries = client.query(index, num_servers)?;
                let answers = cluster.submit(&queries)?;
                Ok(client.reconstruct(&answers)?.len())
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let scheme = Scheme::parse(&args.scheme)
        .ok_or_else(|| format!("unknown scheme: {}", args.scheme))?;

    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .ok_or("no config file; pass --config or set CONFIG")?;
    let config = load_config(Path::new(&config_path))?;
    let cluster = Cluster::new(config.addresses)?;

    let info = cluster.database_info()?;
    let num_blocks = info.num_blocks();
    let span = blocks_for_bits(&info, args.elem_bit_size, args.bits_to_retrieve).min(num_blocks);

    let mut client = match scheme {
        Scheme::VpirIt => Client::It(ItClient::new(query_xof(&args.key), info.clone())),
        Scheme::VpirDpf => Client::Dpf(DpfClient::new(query_xof(&args.key), info.clone())),
        Scheme::PirClassic | Scheme::PirMerkle => {
            Client::Pir(PirClient::new(query_xof(&args.key), info.clone()))
        }
    };

    let mut rng = rand::thread_rng();
    for repetition in 0..args.repetitions {
        let start = if args.id.is_empty() {
            rng.gen_range(0..=num_blocks - span)
        } else {
            hash_to_index(&args.id, num_blocks).min(num_blocks - span)
        };

        for i in 0..span {
            client.retrieve(&cluster, start + i)?;
        }
        println!(
            "repetition {}/{}: retrieved blocks {}..{}",
            repetition + 1,
            args.repetitions,
            start,
            start + span
        );
    }
    Ok(())
}
