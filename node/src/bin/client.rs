//! Thin client for poking a running node: check a balance, trace a
//! transaction, or send coins from the local wallet.

use std::env;
use std::path::PathBuf;
use std::process::exit;

use anyhow::{anyhow, bail, Context, Result};
use tokio::net::TcpStream;

use tclib::crypto::build_spend_message;
use tclib::network::{self, GetActiveChainMsg, GetMempoolMsg, GetUTXOsMsg, Message};
use tclib::types::{Block, OutPoint, Transaction, TxIn, TxOut, UnspentTxOut};
use tclib::wallet::Wallet;
use tclib::{codec, Hash};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: client <node[:port]> balance <address>");
        eprintln!("       client <node[:port]> status <txid>");
        eprintln!("       client <node[:port]> send <address> <value>");
        exit(1);
    }
    let node = &args[1];

    match (args[2].as_str(), &args[3..]) {
        ("balance", [address]) => balance(node, address).await,
        ("status", [txid]) => status(node, txid).await,
        ("send", [address, value]) => {
            let value: u64 = value.parse().context("<value> must be in Belushis")?;
            send(node, address, value).await
        }
        (op, _) => {
            eprintln!("Invalid operation: {op}");
            exit(1);
        }
    }
}

async fn balance(node: &str, address: &str) -> Result<()> {
    let utxos = fetch_utxos(node).await?;
    let total: u64 = utxos
        .iter()
        .filter(|(_, utxo)| utxo.to_address == address)
        .map(|(_, utxo)| utxo.value)
        .sum();
    println!("{total}");
    Ok(())
}

async fn status(node: &str, txid: &str) -> Result<()> {
    let mempool: Vec<Hash> = request(node, Message::GetMempool(GetMempoolMsg {})).await?;
    if mempool.iter().any(|id| id == txid) {
        println!("{txid} is in the mempool");
        return Ok(());
    }

    let chain: Vec<Block> = request(node, Message::GetActiveChain(GetActiveChainMsg {})).await?;
    for (height, block) in chain.iter().enumerate() {
        if block.txns.iter().any(|txn| txn.id() == txid) {
            println!("{txid} is mined in {} at height {height}", block.id());
            return Ok(());
        }
    }
    println!("{txid} not found");
    Ok(())
}

async fn send(node: &str, to_address: &str, value: u64) -> Result<()> {
    let wallet_path =
        env::var("TC_WALLET_PATH").unwrap_or_else(|_| "wallet.dat".to_string());
    let wallet = Wallet::load_or_init(&PathBuf::from(wallet_path))?;
    let pubkey = wallet.privkey.public_key().to_bytes();

    let mine: Vec<UnspentTxOut> = fetch_utxos(node)
        .await?
        .into_iter()
        .map(|(_, utxo)| utxo)
        .filter(|utxo| utxo.to_address == wallet.address)
        .collect();

    let mut selected: Vec<UnspentTxOut> = vec![];
    let mut available = 0u64;
    for utxo in mine {
        if available >= value {
            break;
        }
        available += utxo.value;
        selected.push(utxo);
    }
    if available < value {
        bail!("balance {available} is less than {value}");
    }

    // excess over the send value is left to the miner as fee
    let txouts = vec![TxOut {
        value,
        to_address: to_address.to_string(),
    }];
    let txins = selected
        .iter()
        .map(|utxo| {
            let spend_message = build_spend_message(&utxo.outpoint(), &pubkey, 0, &txouts);
            TxIn {
                to_spend: Some(utxo.outpoint()),
                unlock_sig: Some(wallet.privkey.sign(&spend_message)),
                unlock_pk: Some(pubkey.clone()),
                sequence: 0,
            }
        })
        .collect();
    let txn = Transaction {
        txins,
        txouts,
        locktime: None,
    };

    let mut stream = connect(node).await?;
    network::send_message(&mut stream, &Message::Transaction(txn.clone())).await?;
    println!("{}", txn.id());
    Ok(())
}

async fn fetch_utxos(node: &str) -> Result<Vec<(OutPoint, UnspentTxOut)>> {
    request(node, Message::GetUtxos(GetUTXOsMsg {})).await
}

async fn connect(node: &str) -> Result<TcpStream> {
    let addr = if node.contains(':') {
        node.to_string()
    } else {
        let port = env::var("TC_PORT").unwrap_or_else(|_| "9999".to_string());
        format!("{node}:{port}")
    };
    TcpStream::connect(&addr)
        .await
        .with_context(|| format!("could not reach {addr}"))
}

async fn request<T: serde::de::DeserializeOwned>(node: &str, message: Message) -> Result<T> {
    let mut stream = connect(node).await?;
    network::send_message(&mut stream, &message).await?;
    let payload = network::read_frame(&mut stream).await?;
    codec::deserialize(&payload).map_err(|err| anyhow!("bad response: {err}"))
}
