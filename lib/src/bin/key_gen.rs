use std::env;
use std::path::PathBuf;
use std::process::exit;

use tclib::wallet::Wallet;

fn main() {
    let path = env::args().nth(1).unwrap_or_else(|| "wallet.dat".to_string());

    match Wallet::load_or_init(&PathBuf::from(&path)) {
        Ok(wallet) => println!("{}", wallet.address),
        Err(err) => {
            eprintln!("could not initialize wallet at {path}: {err}");
            exit(1);
        }
    }
}
