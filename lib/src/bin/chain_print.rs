use std::process::exit;
use std::{env, fs};

use tclib::codec;
use tclib::types::Block;

fn main() {
    let Some(path) = env::args().nth(1) else {
        eprintln!("Usage: chain_print <chain_file>");
        exit(1);
    };

    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("could not read {path}: {err}");
            exit(1);
        }
    };
    let blocks: Vec<Block> = match codec::decode_framed(&raw).and_then(codec::deserialize) {
        Ok(blocks) => blocks,
        Err(err) => {
            eprintln!("{path} does not hold a chain: {err}");
            exit(1);
        }
    };

    for (height, block) in blocks.iter().enumerate() {
        println!(
            "{height:>6}  {}  bits={:<3} txns={:<4} time={}",
            block.id(),
            block.bits,
            block.txns.len(),
            block.timestamp
        );
    }
}
