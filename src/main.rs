use clap::Parser;
use data_encoding::HEXLOWER;
use ferrocoin::{
    central_node_addr, convert_address, hash_pub_key, send_tx, validate_address,
    address_to_pub_key_hash, Blockchain, Command, Node, Opt, Server, Transaction, UTXOSet,
    Wallets,
};
use log::{error, LevelFilter};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const MINE_IMMEDIATELY: usize = 1;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Createblockchain { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let blockchain = Blockchain::create_blockchain(&address)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::new()?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}");
        }
        Command::GetBalance { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let pub_key_hash = address_to_pub_key_hash(&address)?;

            let blockchain = Blockchain::open_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain);
            let balance: i64 = utxo_set
                .find_utxo(&pub_key_hash)?
                .iter()
                .map(|utxo| utxo.get_value())
                .sum();
            println!("Balance of {address}: {balance}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::new()?;
            for address in wallets.get_addresses() {
                println!("{address}");
            }
        }
        Command::Send {
            from,
            to,
            amount,
            mine,
        } => {
            if !validate_address(&from) {
                return Err(format!("Invalid sender address: {from}").into());
            }
            if !validate_address(&to) {
                return Err(format!("Invalid recipient address: {to}").into());
            }
            if amount <= 0 {
                return Err("Amount must be positive".into());
            }

            let blockchain = Blockchain::open_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain.clone());

            let wallets = Wallets::new()?;
            let wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| format!("No wallet for address: {from}"))?;
            let transaction = Transaction::new_utxo_transaction(wallet, &to, amount, &utxo_set)?;

            if mine == MINE_IMMEDIATELY {
                let coinbase = Transaction::new_coinbase_tx(&from, &[])?;
                let block =
                    blockchain.mine_block(&[coinbase, transaction], &AtomicBool::new(false))?;
                utxo_set.update(&block)?;
            } else {
                send_tx(&central_node_addr()?, &transaction)?;
            }
            println!("Success!");
        }
        Command::Printchain => {
            let blockchain = Blockchain::open_blockchain()?;
            for block in blockchain.iterator() {
                println!("Prev hash : {}", HEXLOWER.encode(block.get_prev_block_hash()));
                println!("Hash      : {}", HEXLOWER.encode(block.get_hash()));
                println!("Height    : {}", block.get_height());
                println!("Timestamp : {}", block.get_timestamp());
                println!("Difficulty: {}", block.get_difficulty());

                for tx in block.get_transactions() {
                    println!("- Transaction {}", HEXLOWER.encode(tx.get_id()));
                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let pub_key_hash = hash_pub_key(input.get_pub_key());
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                                convert_address(&pub_key_hash),
                            );
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_value(),
                            convert_address(output.get_pub_key_hash()),
                        );
                    }
                }
                println!();
            }
        }
        Command::Reindexutxo => {
            let blockchain = Blockchain::open_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            let count = utxo_set.count_transactions()?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
        Command::StartNode { miner } => {
            let blockchain = Blockchain::open_blockchain()?;
            let node = Arc::new(Node::new());

            if let Some(addr) = miner {
                if !validate_address(&addr) {
                    return Err(format!("Invalid miner address: {addr}").into());
                }
                println!("Mining is on. Address to receive rewards: {addr}");
                node.set_mining_addr(addr);
            }

            // flush and close the store on SIGINT/SIGTERM, then exit; the
            // miner observes the flag between nonce batches
            let shutdown_node = Arc::clone(&node);
            let shutdown_chain = blockchain.clone();
            ctrlc::set_handler(move || {
                shutdown_node.request_shutdown();
                if let Err(e) = shutdown_chain.flush() {
                    error!("Failed to flush store on shutdown: {e}");
                }
                process::exit(0);
            })?;

            let server = Server::new(blockchain, node);
            server.run()?;
        }
    }
    Ok(())
}
