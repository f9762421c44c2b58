//! `hdnode` command line: derive extended keys from a seed or an existing xkey.

use std::sync::Arc;

use clap::{arg, ArgMatches, Command};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use crate::bip32::{
  Base58Check, Bip32Error, ChildNumber, Network, Node, Secp256k1Generator, HARDENED_OFFSET,
};

const KNOWN_NETWORKS: [Network; 2] = [Network::Mainnet, Network::Testnet];

fn init_logging() {
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  let _ = fmt::Subscriber::builder()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .try_init();
}

fn network_arg(matches: &ArgMatches) -> Network {
  match matches.get_one::<String>("network").map(String::as_str) {
    Some("testnet") => Network::Testnet,
    _ => Network::Mainnet,
  }
}

/// Root node from `--seed` or `--xkey`, plus the network to print with.
fn load_root(matches: &ArgMatches) -> Result<(Node, Network), Bip32Error> {
  let generator = Arc::new(Secp256k1Generator::new());
  let network = network_arg(matches);
  match (
    matches.get_one::<Vec<u8>>("seed"),
    matches.get_one::<String>("xkey"),
  ) {
    (Some(seed), None) => Ok((Node::from_seed(generator, seed)?, network)),
    (None, Some(xkey)) => {
      let (node, parsed) = Node::from_extended_key(generator, &Base58Check, xkey, &KNOWN_NETWORKS)?;
      debug!(?parsed, "parsed extended key");
      Ok((node, parsed))
    }
    _ => unreachable!("seed and xkey must be mutually-exclusive"),
  }
}

fn run_cmd_derive(matches: &ArgMatches) -> Result<(), Bip32Error> {
  let (root, network) = load_root(matches)?;
  let spec: &String = matches.get_one("path").expect("path should be required");
  let force_public = matches.get_flag("public");

  for node in root.subkeys(spec)? {
    let node = node?;
    let as_private = node.is_private() && !force_public;
    println!("{}", node.to_extended_key(&Base58Check, network, as_private)?);
  }
  Ok(())
}

fn run_cmd_children(matches: &ArgMatches) -> Result<(), Bip32Error> {
  let (root, network) = load_root(matches)?;
  let max_level = *matches.get_one::<u32>("max-level").expect("max-level has a default");
  let start = *matches.get_one::<u32>("start").expect("start has a default");
  let include_hardened = !matches.get_flag("no-hardened");

  for node in root.children(max_level, start, include_hardened) {
    let node = node?;
    println!(
      "{}\t{}",
      ChildNumber::from(node.child_index()),
      node.to_extended_key(&Base58Check, network, node.is_private())?
    );
  }
  Ok(())
}

fn run_cmd_inspect(matches: &ArgMatches) -> Result<(), Bip32Error> {
  let (node, network) = load_root(matches)?;
  println!("network:            {network:?}");
  println!("private:            {}", node.is_private());
  println!("depth:              {}", node.depth());
  println!("fingerprint:        {}", hex::encode(node.fingerprint()));
  println!("parent fingerprint: {}", hex::encode(node.parent_fingerprint()));
  println!("child number:       {}", ChildNumber::from(node.child_index()));
  println!("chain code:         {}", hex::encode(node.chain_code()));
  println!("public key:         {}", hex::encode(node.sec()));
  Ok(())
}

fn root_args(cmd: Command) -> Command {
  cmd
    .arg(
      arg!(-s --seed <SEED> "Seed bytes, given as a hexadecimal string")
        .id("seed")
        .required_unless_present("xkey")
        .conflicts_with("xkey")
        .value_parser(|s: &str| hex::decode(s).map_err(|_| "seed must be a hexadecimal string")),
    )
    .arg(
      arg!(-x --xkey <XKEY> "BIP-32 extended key, private or public (any depth)")
        .id("xkey")
        .required_unless_present("seed")
        .conflicts_with("seed"),
    )
    .arg(
      arg!(-n --network <NETWORK> "network used when printing seed-derived keys")
        .id("network")
        .default_value("mainnet")
        .value_parser(["mainnet", "testnet"]),
    )
}

fn command() -> Command {
  Command::new(env!("CARGO_CRATE_NAME"))
    .version(env!("CARGO_PKG_VERSION"))
    .about("BIP-32 hierarchical deterministic key derivation")
    .arg_required_else_help(true)
    .subcommand(
      root_args(
        Command::new("derive")
          .about("Derive child keys for a path or ranged path spec, one per line")
          .arg(arg!(<PATH> "Path e.g. 0H/1/2, or spec e.g. 0H/0-4,1/0.pub").id("path"))
          .arg(arg!(-p --public "Print public extended keys only").id("public")),
      ),
    )
    .subcommand(
      root_args(
        Command::new("children")
          .about("List the direct children of the root, normal then hardened per index")
          .arg(
            arg!(-l --"max-level" <N> "Last index is start + N")
              .id("max-level")
              .default_value("19")
              .value_parser(clap::value_parser!(u32)),
          )
          .arg(
            arg!(--start <INDEX> "First child index")
              .id("start")
              .default_value("0")
              .value_parser(clap::value_parser!(u32).range(..i64::from(HARDENED_OFFSET))),
          )
          .arg(arg!(--"no-hardened" "Skip hardened children").id("no-hardened")),
      ),
    )
    .subcommand(root_args(
      Command::new("inspect").about("Show the fields of a seed's master node or an extended key"),
    ))
}

/// Parse arguments, run the subcommand and return the process exit code.
pub fn run() -> i32 {
  init_logging();
  let matches = command().get_matches();

  let result = match matches.subcommand() {
    Some(("derive", matches)) => run_cmd_derive(matches),
    Some(("children", matches)) => run_cmd_children(matches),
    Some(("inspect", matches)) => run_cmd_inspect(matches),
    _ => unreachable!("top-level subcommand should be required"),
  };
  match result {
    Ok(()) => 0,
    Err(e) => {
      eprintln!("error: {e}");
      1
    }
  }
}
