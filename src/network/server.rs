use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, Blockchain, Transaction};
use crate::error::{NodeError, Result};
use crate::network::message::{
    AddrPayload, BlockPayload, GetBlocksPayload, GetDataPayload, InvPayload, OpType, Package,
    TxPayload, VersionPayload,
};
use crate::network::node::{Node, PeerState};
use crate::storage::UTXOSet;
use data_encoding::HEXLOWER;
use log::{error, info, warn};
use std::fs;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const NODE_VERSION: usize = 1;

/// Mempool size at which a non-central miner starts a mining round.
pub const TRANSACTION_THRESHOLD: usize = 2;

const TCP_TIMEOUT_MS: u64 = 5000;
const PEER_SCAN_INTERVAL_SECS: u64 = 30;
const MINER_POLL_INTERVAL_MS: u64 = 500;

/// The P2P server: a listener handling one framed message per connection,
/// a peer-scanning loop over the candidate ports, and an optional miner.
pub struct Server {
    blockchain: Blockchain,
    node: Arc<Node>,
}

impl Server {
    pub fn new(blockchain: Blockchain, node: Arc<Node>) -> Self {
        Self { blockchain, node }
    }

    /// Bind the first free candidate port and serve until shutdown.
    pub fn run(&self) -> Result<()> {
        let candidates = read_port_candidates(GLOBAL_CONFIG.ports_file())?;
        let central = candidates
            .first()
            .cloned()
            .ok_or_else(|| NodeError::Config("Ports file has no entries".to_string()))?;
        let (listener, local_addr) = bind_first_free(&candidates)?;

        self.node.set_addr(local_addr.clone());
        self.node.known_nodes().add_node(central.clone());
        info!("Server listening on {local_addr}");

        self.spawn_peer_scan(candidates);
        if self.node.is_miner() {
            self.spawn_miner();
        }

        if local_addr != central {
            Self::send_version(&self.node, &central, self.blockchain.best_height())?;
        }

        for stream in listener.incoming() {
            if self.node.is_shutdown() {
                break;
            }
            match stream {
                Ok(stream) => {
                    let blockchain = self.blockchain.clone();
                    let node = Arc::clone(&self.node);
                    thread::spawn(move || Self::handle_connection(blockchain, node, stream));
                }
                Err(e) => error!("Error accepting connection: {e}"),
            }
        }
        Ok(())
    }

    /// Probe the candidate ports every 30 seconds and introduce ourselves
    /// to anyone we do not know yet.
    fn spawn_peer_scan(&self, candidates: Vec<String>) {
        let blockchain = self.blockchain.clone();
        let node = Arc::clone(&self.node);
        thread::spawn(move || {
            while !node.is_shutdown() {
                info!("Scanning for peers");
                for addr in &candidates {
                    if *addr != node.addr() && !node.known_nodes().node_is_known(addr) {
                        if let Err(e) = Self::send_version(&node, addr, blockchain.best_height()) {
                            warn!("Failed to probe {addr}: {e}");
                        }
                    }
                }
                thread::sleep(Duration::from_secs(PEER_SCAN_INTERVAL_SECS));
            }
        });
    }

    /// Background miner: drains the mempool whenever it is non-empty.
    fn spawn_miner(&self) {
        let blockchain = self.blockchain.clone();
        let node = Arc::clone(&self.node);
        thread::spawn(move || {
            while !node.is_shutdown() {
                if !node.mempool().is_empty() {
                    match Self::mine_pending(&blockchain, &node) {
                        Ok(()) => {}
                        Err(NodeError::Shutdown) => break,
                        Err(e) => error!("Mining round failed: {e}"),
                    }
                }
                thread::sleep(Duration::from_millis(MINER_POLL_INTERVAL_MS));
            }
        });
    }

    fn handle_connection(blockchain: Blockchain, node: Arc<Node>, mut stream: TcpStream) {
        if let Err(e) = stream.set_read_timeout(Some(Duration::from_secs(60))) {
            error!("Failed to set read timeout: {e}");
            return;
        }

        // Never panic on peer input: undecodable frames are logged and the
        // connection dropped.
        let package = match Package::read_from(&mut stream) {
            Ok(package) => package,
            Err(e) => {
                warn!("Dropping undecodable message: {e}");
                return;
            }
        };

        info!("Received {} command", package.command());
        if let Err(e) = Self::process_package(&blockchain, &node, package) {
            // store failures are not survivable; everything else only costs
            // this one message
            if let NodeError::Store(msg) = &e {
                error!("Fatal store error: {msg}");
                let _ = blockchain.flush();
                std::process::exit(1);
            }
            error!("Error processing message: {e}");
        }
        let _ = stream.shutdown(Shutdown::Both);
    }

    fn process_package(blockchain: &Blockchain, node: &Node, package: Package) -> Result<()> {
        match package {
            Package::Version(payload) => Self::handle_version(blockchain, node, payload),
            Package::Verack(payload) => Self::handle_verack(blockchain, node, payload),
            Package::Addr(payload) => Self::handle_addr(node, payload),
            Package::Inv(payload) => Self::handle_inv(blockchain, node, payload),
            Package::GetBlocks(payload) => Self::handle_get_blocks(blockchain, node, payload),
            Package::GetData(payload) => Self::handle_get_data(blockchain, node, payload),
            Package::Block(payload) => Self::handle_block(blockchain, node, payload),
            Package::Tx(payload) => Self::handle_tx(blockchain, node, payload),
        }
    }

    fn handle_version(blockchain: &Blockchain, node: &Node, payload: VersionPayload) -> Result<()> {
        info!(
            "Version from {}: height {}",
            payload.addr_from, payload.best_height
        );
        let my_height = blockchain.best_height();
        Self::send_verack(node, &payload.addr_from, my_height)?;

        if payload.best_height > my_height {
            Self::send_get_blocks(node, &payload.addr_from)?;
        }

        if payload.addr_from != node.addr()
            && !node.known_nodes().node_is_known(&payload.addr_from)
        {
            node.known_nodes().add_node(payload.addr_from.clone());
            // the central node shares its peer list with newcomers
            if node.is_central() {
                Self::send_addr(node, &payload.addr_from)?;
            }
        }
        node.set_peer_state(&payload.addr_from, PeerState::Versioned);
        Ok(())
    }

    fn handle_verack(blockchain: &Blockchain, node: &Node, payload: VersionPayload) -> Result<()> {
        let my_height = blockchain.best_height();
        if payload.addr_from != node.addr() {
            node.known_nodes().add_node(payload.addr_from.clone());
        }

        if payload.best_height > my_height {
            node.set_peer_state(&payload.addr_from, PeerState::Versioned);
            Self::send_get_blocks(node, &payload.addr_from)?;
        } else {
            // nothing to fetch from this peer
            node.set_peer_state(&payload.addr_from, PeerState::Synced);
        }
        Ok(())
    }

    fn handle_addr(node: &Node, payload: AddrPayload) -> Result<()> {
        for addr in payload.addr_list {
            if addr != node.addr() {
                node.known_nodes().add_node(addr);
            }
        }
        info!("{} known nodes", node.known_nodes().len());
        for peer in node.known_nodes().get_nodes() {
            if peer != node.addr() {
                Self::send_get_blocks(node, &peer)?;
            }
        }
        Ok(())
    }

    fn handle_get_blocks(
        blockchain: &Blockchain,
        node: &Node,
        payload: GetBlocksPayload,
    ) -> Result<()> {
        let hashes = blockchain.get_block_hashes();
        Self::send_inv(node, &payload.addr_from, OpType::Block, hashes)
    }

    fn handle_inv(blockchain: &Blockchain, node: &Node, payload: InvPayload) -> Result<()> {
        info!(
            "Inventory with {} {:?} items from {}",
            payload.items.len(),
            payload.op_type,
            payload.addr_from
        );
        match payload.op_type {
            OpType::Block => {
                let missing = missing_block_hashes(blockchain, &payload.items)?;
                if missing.is_empty() {
                    node.set_peer_state(&payload.addr_from, PeerState::Synced);
                    return Ok(());
                }
                node.blocks_in_transit().replace(missing);
                if let Some(hash) = node.blocks_in_transit().take_oldest() {
                    Self::send_get_data(node, &payload.addr_from, OpType::Block, &hash)?;
                }
            }
            OpType::Tx => {
                if let Some(txid) = payload.items.first() {
                    let txid_hex = HEXLOWER.encode(txid);
                    if !node.mempool().contains(&txid_hex) {
                        Self::send_get_data(node, &payload.addr_from, OpType::Tx, txid)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_get_data(blockchain: &Blockchain, node: &Node, payload: GetDataPayload) -> Result<()> {
        match payload.op_type {
            OpType::Block => match blockchain.get_block(&payload.id)? {
                Some(block) => Self::send_block(node, &payload.addr_from, &block)?,
                None => info!("Requested block not found"),
            },
            OpType::Tx => {
                let txid_hex = HEXLOWER.encode(&payload.id);
                match node.mempool().get(&txid_hex) {
                    Some(tx) => Self::send_tx_message(node, &payload.addr_from, &tx)?,
                    None => info!("Requested transaction {txid_hex} not in mempool"),
                }
            }
        }
        Ok(())
    }

    fn handle_block(blockchain: &Blockchain, node: &Node, payload: BlockPayload) -> Result<()> {
        let block = Block::deserialize(&payload.block)
            .map_err(|e| NodeError::MalformedMessage(format!("Undecodable block: {e}")))?;

        if let Err(e) = blockchain.validate_incoming_block(&block) {
            warn!("Rejecting block from {}: {e}", payload.addr_from);
            return Ok(());
        }

        blockchain.add_block(&block)?;
        info!(
            "Added block {} from {}",
            HEXLOWER.encode(block.get_hash()),
            payload.addr_from
        );

        if !node.blocks_in_transit().is_empty() {
            if let Some(hash) = node.blocks_in_transit().take_oldest() {
                Self::send_get_data(node, &payload.addr_from, OpType::Block, &hash)?;
            }
        } else {
            UTXOSet::new(blockchain.clone()).reindex()?;
            node.set_peer_state(&payload.addr_from, PeerState::Synced);
        }
        Ok(())
    }

    fn handle_tx(blockchain: &Blockchain, node: &Node, payload: TxPayload) -> Result<()> {
        let tx = Transaction::deserialize(&payload.transaction)
            .map_err(|e| NodeError::MalformedMessage(format!("Undecodable transaction: {e}")))?;
        let txid_hex = HEXLOWER.encode(tx.get_id());

        if node.mempool().contains(&txid_hex) {
            return Ok(());
        }
        if blockchain.find_transaction(tx.get_id()).is_some() {
            info!("Transaction {txid_hex} already confirmed");
            return Ok(());
        }
        match blockchain.verify_tx(&tx) {
            Ok(true) => {}
            Ok(false) => {
                warn!("Rejecting transaction {txid_hex}: bad signature");
                return Ok(());
            }
            Err(e) => {
                warn!("Rejecting transaction {txid_hex}: {e}");
                return Ok(());
            }
        }

        node.mempool().add(tx.clone());
        info!("{}: {} transactions in mempool", node.addr(), node.mempool().len());

        if node.is_central() {
            for peer in node.known_nodes().get_nodes() {
                if peer != node.addr() && peer != payload.addr_from {
                    Self::send_inv(node, &peer, OpType::Tx, vec![tx.get_id().to_vec()])?;
                }
            }
        } else if node.mempool().len() >= TRANSACTION_THRESHOLD && node.is_miner() {
            Self::mine_pending(blockchain, node)?;
        }
        Ok(())
    }

    /// Drain the mempool into blocks: verify, mine with a coinbase to the
    /// configured address, refresh the UTXO index, announce, repeat until
    /// the pool is empty.
    fn mine_pending(blockchain: &Blockchain, node: &Node) -> Result<()> {
        loop {
            if node.is_shutdown() {
                return Err(NodeError::Shutdown);
            }

            let mut txs = vec![];
            for tx in node.mempool().get_all() {
                let txid_hex = HEXLOWER.encode(tx.get_id());
                match blockchain.verify_tx(&tx) {
                    Ok(true) => txs.push(tx),
                    _ => {
                        warn!("Dropping invalid mempool transaction {txid_hex}");
                        node.mempool().remove(&txid_hex);
                    }
                }
            }
            if txs.is_empty() {
                info!("No valid transactions to mine");
                return Ok(());
            }

            let mining_addr = node.mining_addr().ok_or_else(|| {
                NodeError::Config("Mining address not configured".to_string())
            })?;
            let coinbase = Transaction::new_coinbase_tx(&mining_addr, &[])?;
            let mut block_txs = vec![coinbase];
            block_txs.extend(txs);

            let shutdown = node.shutdown_flag();
            let block = blockchain.mine_block(&block_txs, &shutdown)?;
            UTXOSet::new(blockchain.clone()).reindex()?;

            for tx in &block_txs {
                node.mempool().remove(&HEXLOWER.encode(tx.get_id()));
            }
            info!("New block {} mined", HEXLOWER.encode(block.get_hash()));

            for peer in node.known_nodes().get_nodes() {
                if peer != node.addr() {
                    Self::send_inv(node, &peer, OpType::Block, vec![block.get_hash().to_vec()])?;
                }
            }

            if node.mempool().is_empty() {
                return Ok(());
            }
        }
    }

    fn send_version(node: &Node, addr: &str, best_height: i64) -> Result<()> {
        Self::send_data(
            node,
            addr,
            Package::Version(VersionPayload {
                addr_from: node.addr(),
                version: NODE_VERSION,
                best_height,
            }),
        )
    }

    fn send_verack(node: &Node, addr: &str, best_height: i64) -> Result<()> {
        Self::send_data(
            node,
            addr,
            Package::Verack(VersionPayload {
                addr_from: node.addr(),
                version: NODE_VERSION,
                best_height,
            }),
        )
    }

    fn send_addr(node: &Node, addr: &str) -> Result<()> {
        Self::send_data(
            node,
            addr,
            Package::Addr(AddrPayload {
                addr_list: node.known_nodes().get_nodes(),
            }),
        )
    }

    fn send_get_blocks(node: &Node, addr: &str) -> Result<()> {
        Self::send_data(
            node,
            addr,
            Package::GetBlocks(GetBlocksPayload {
                addr_from: node.addr(),
            }),
        )
    }

    fn send_get_data(node: &Node, addr: &str, op_type: OpType, id: &[u8]) -> Result<()> {
        Self::send_data(
            node,
            addr,
            Package::GetData(GetDataPayload {
                addr_from: node.addr(),
                op_type,
                id: id.to_vec(),
            }),
        )
    }

    fn send_inv(node: &Node, addr: &str, op_type: OpType, items: Vec<Vec<u8>>) -> Result<()> {
        Self::send_data(
            node,
            addr,
            Package::Inv(InvPayload {
                addr_from: node.addr(),
                op_type,
                items,
            }),
        )
    }

    fn send_block(node: &Node, addr: &str, block: &Block) -> Result<()> {
        Self::send_data(
            node,
            addr,
            Package::Block(BlockPayload {
                addr_from: node.addr(),
                block: block.serialize()?,
            }),
        )
    }

    fn send_tx_message(node: &Node, addr: &str, tx: &Transaction) -> Result<()> {
        Self::send_data(
            node,
            addr,
            Package::Tx(TxPayload {
                addr_from: node.addr(),
                transaction: tx.serialize()?,
            }),
        )
    }

    /// Open a connection, write one frame, close. A refused connection
    /// evicts the peer and is not an error for the caller.
    fn send_data(node: &Node, addr: &str, package: Package) -> Result<()> {
        if addr.is_empty() || addr == node.addr() {
            return Ok(());
        }
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| NodeError::Network(format!("Invalid address {addr}: {e}")))?;

        let mut stream =
            match TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_TIMEOUT_MS)) {
                Ok(stream) => stream,
                Err(_) => {
                    warn!("{addr} is unavailable, evicting from known nodes");
                    node.forget_peer(addr);
                    return Ok(());
                }
            };
        stream
            .set_write_timeout(Some(Duration::from_millis(TCP_TIMEOUT_MS)))
            .map_err(|e| NodeError::Network(format!("Failed to set write timeout: {e}")))?;

        package.write_to(&mut stream)?;
        stream
            .flush()
            .map_err(|e| NodeError::Network(format!("Failed to flush to {addr}: {e}")))?;
        Ok(())
    }
}

/// Announced hashes we do not have yet, in announcement order. The walk
/// stops at the first hash already in the chain; on an empty chain every
/// item is missing.
fn missing_block_hashes(blockchain: &Blockchain, items: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
    let mut missing = vec![];
    for item in items {
        if blockchain.contains(item)? {
            break;
        }
        missing.push(item.clone());
    }
    Ok(missing)
}

/// Parse the newline-separated candidate port file into socket addresses.
pub fn read_port_candidates(path: &str) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| NodeError::Config(format!("Could not read ports file {path}: {e}")))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|port| format!("127.0.0.1:{port}"))
        .collect())
}

/// The designated central node: the first candidate port.
pub fn central_node_addr() -> Result<String> {
    read_port_candidates(GLOBAL_CONFIG.ports_file())?
        .first()
        .cloned()
        .ok_or_else(|| NodeError::Config("Ports file has no entries".to_string()))
}

fn bind_first_free(candidates: &[String]) -> Result<(TcpListener, String)> {
    for addr in candidates {
        if let Ok(listener) = TcpListener::bind(addr) {
            return Ok((listener, addr.clone()));
        }
    }
    Err(NodeError::Network("No available ports".to_string()))
}

/// Hand a freshly built transaction to a node (normally the central one).
/// Used by the CLI's non-mining `send` path.
pub fn send_tx(addr: &str, tx: &Transaction) -> Result<()> {
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| NodeError::Network(format!("Invalid address {addr}: {e}")))?;
    let mut stream = TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_TIMEOUT_MS))
        .map_err(|_| NodeError::PeerUnavailable(addr.to_string()))?;

    let package = Package::Tx(TxPayload {
        addr_from: String::new(),
        transaction: tx.serialize()?,
    });
    package.write_to(&mut stream)?;
    stream
        .flush()
        .map_err(|e| NodeError::Network(format!("Failed to flush to {addr}: {e}")))?;
    Ok(())
}
