//! Packet loop and outbound query construction (§4.7, §5).

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::address::Address;
use crate::domain::config::DhtConfig;
use crate::domain::error::{InsertError, QueryError};
use crate::domain::node::Node;
use crate::domain::node_id::NodeId;
use crate::domain::timestamp::Timestamp;
use crate::krpc::message::{Msg, MsgBody, QueryArgs};
use crate::ports::{ConnectionTracker, IpBlocklist, MetricsSink, QueryHooks, Receiver, Sender, TimeSource};
use crate::routing::table::{AddOutcome, RoutingTableStats};
use crate::routing::RoutingTable;
use crate::token::TokenServer;
use crate::transaction::{Transaction, TransactionIdAllocator, TransactionOutcome, TransactionTable};

/// The Server owns the transaction table and routing table behind a single
/// short-held lock apiece; Transactions hold no pointer back to it at all,
/// only the narrow ports they need, which sidesteps the cyclic-ownership
/// hazard the design notes call out.
pub struct Server {
    pub local_id: NodeId,
    config: DhtConfig,
    routing: Mutex<RoutingTable>,
    transactions: TransactionTable,
    id_alloc: TransactionIdAllocator,
    tokens: Mutex<TokenServer>,
    sender: Arc<dyn Sender>,
    receiver: Arc<dyn Receiver>,
    tracker: Arc<dyn ConnectionTracker>,
    time: Arc<dyn TimeSource>,
    blocklist: Arc<dyn IpBlocklist>,
    metrics: Arc<dyn MetricsSink>,
    hooks: Arc<dyn QueryHooks>,
    closed: AtomicBool,
}

impl Server {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DhtConfig,
        sender: Arc<dyn Sender>,
        receiver: Arc<dyn Receiver>,
        tracker: Arc<dyn ConnectionTracker>,
        time: Arc<dyn TimeSource>,
        blocklist: Arc<dyn IpBlocklist>,
        metrics: Arc<dyn MetricsSink>,
        hooks: Arc<dyn QueryHooks>,
    ) -> Arc<Server> {
        let local_id = config.node_id.unwrap_or_else(NodeId::random);
        let now = time.now();
        Arc::new(Server {
            local_id,
            routing: Mutex::new(RoutingTable::new(local_id, config.bucket_k)),
            transactions: TransactionTable::new(),
            id_alloc: TransactionIdAllocator::new(),
            tokens: Mutex::new(TokenServer::new(config.token_interval, config.token_retained_secrets, now)),
            sender,
            receiver,
            tracker,
            time,
            blocklist,
            metrics,
            hooks,
            closed: AtomicBool::new(false),
            config,
        })
    }

    pub fn routing_stats(&self) -> RoutingTableStats {
        self.routing.lock().stats(self.time.now())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sets the closed flag and cancels every outstanding transaction.
    /// Socket teardown itself is the caller's responsibility (it owns the
    /// concrete transport), which then unblocks `run_receive_loop` with an
    /// I/O error that is treated as a clean shutdown, not a panic.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.transactions.cancel_all();
    }

    fn security_gate(&self, id: NodeId, addr: &Address) -> Result<(), InsertError> {
        if id.is_zero() {
            return Err(InsertError::ZeroId);
        }
        if id == self.local_id {
            return Err(InsertError::SelfId);
        }
        if self.blocklist.is_blocked(addr.ip()) {
            return Err(InsertError::Blocklisted);
        }
        if !self.config.no_security && !id.verify_secure(addr.ip()) {
            return Err(InsertError::InsecureId);
        }
        Ok(())
    }

    /// Attempts to admit an observed `(id, addr)` pair into the routing
    /// table. Rejections are logged and counted, never surfaced.
    pub(crate) fn observe_node(&self, id: NodeId, addr: Address) {
        if let Err(e) = self.security_gate(id, &addr) {
            debug!(%id, %addr, error = %e, "rejected node insertion");
            self.metrics.incr("insert_rejected");
            return;
        }
        let now = self.time.now();
        let node = Node::new(id, addr);
        match self.routing.lock().add(node, now) {
            AddOutcome::Inserted => self.metrics.incr("node_inserted"),
            AddOutcome::Replaced { evicted } => {
                debug!(%evicted, "evicted bad node to admit new peer");
                self.metrics.incr("node_replaced");
            }
            AddOutcome::Full => self.metrics.incr("bucket_full_rejected"),
        }
    }

    pub(crate) fn on_query_from(&self, id: NodeId, addr: Address, now: Timestamp) {
        self.observe_node(id, addr);
        self.routing.lock().mark_queried(&id, now);
    }

    pub(crate) fn on_response_from(&self, id: NodeId, addr: Address, now: Timestamp) {
        self.observe_node(id, addr);
        self.routing.lock().mark_responded(&id, now);
    }

    pub(crate) fn mark_failed_at(&self, addr: &Address) {
        let ids = self.routing.lock().ids_at_address(addr);
        let mut table = self.routing.lock();
        for id in ids {
            table.mark_failed(&id);
        }
    }

    pub(crate) fn config(&self) -> &DhtConfig {
        &self.config
    }

    pub(crate) fn public_ip(&self) -> Option<IpAddr> {
        self.config.public_ip
    }

    pub(crate) fn tokens(&self) -> &Mutex<TokenServer> {
        &self.tokens
    }

    pub(crate) fn routing_table(&self) -> &Mutex<RoutingTable> {
        &self.routing
    }

    pub(crate) fn hooks(&self) -> &Arc<dyn QueryHooks> {
        &self.hooks
    }

    pub(crate) fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.time.now()
    }

    /// Looks up and removes a transaction matching `(remote, t)` exactly,
    /// per the inbound-response lookup rule in §4.4.
    pub(crate) fn transactions_remove(&self, remote: &Address, t: &[u8]) -> Option<Arc<Transaction>> {
        self.transactions.remove(remote, t)
    }

    pub(crate) async fn send_raw(&self, to: Address, bytes: Vec<u8>) -> std::io::Result<()> {
        self.sender.send_to(to, bytes).await
    }

    pub async fn ping(&self, remote: Address) -> Result<Msg, QueryError> {
        self.query_raw(remote, "ping", QueryArgs::default()).await
    }

    pub async fn find_node(&self, remote: Address, target: NodeId, want: Option<Vec<String>>) -> Result<Msg, QueryError> {
        let args = QueryArgs {
            target: Some(serde_bytes::ByteBuf::from(target.to_bytes().to_vec())),
            want,
            ..Default::default()
        };
        self.query_raw(remote, "find_node", args).await
    }

    pub async fn get_peers(&self, remote: Address, info_hash: NodeId, want: Option<Vec<String>>) -> Result<Msg, QueryError> {
        let args = QueryArgs {
            info_hash: Some(serde_bytes::ByteBuf::from(info_hash.to_bytes().to_vec())),
            want,
            ..Default::default()
        };
        self.query_raw(remote, "get_peers", args).await
    }

    pub async fn announce_peer(
        &self,
        remote: Address,
        info_hash: NodeId,
        port: u16,
        token: Vec<u8>,
        implied_port: bool,
    ) -> Result<Msg, QueryError> {
        let args = QueryArgs {
            info_hash: Some(serde_bytes::ByteBuf::from(info_hash.to_bytes().to_vec())),
            port: Some(port),
            token: Some(serde_bytes::ByteBuf::from(token)),
            implied_port: if implied_port { Some(1) } else { None },
            ..Default::default()
        };
        self.query_raw(remote, "announce_peer", args).await
    }

    async fn query_raw(&self, remote: Address, query_name: &str, mut args: QueryArgs) -> Result<Msg, QueryError> {
        args.id = self.local_id.to_bytes().to_vec();
        let id = self.id_alloc.next();
        let msg = Msg {
            transaction_id: id.clone(),
            body: MsgBody::Query { q: query_name.to_string(), a: args },
            read_only: self.config.passive,
            ip: None,
        };
        let encoded = crate::krpc::encode(&msg).expect("outbound message always encodes");

        let (txn, rx) = Transaction::new(id.clone(), remote, query_name, self.config.max_sends, self.config.resend_delay);
        self.transactions.insert(remote, id.clone(), txn.clone());

        let sender = self.sender.clone();
        let tracker = self.tracker.clone();
        let time = self.time.clone();
        tokio::spawn(txn.clone().run(sender, tracker, time, encoded));

        let outcome = rx.await.unwrap_or(TransactionOutcome::Cancelled);
        self.transactions.remove(&remote, &id);

        match outcome {
            TransactionOutcome::Response(reply) => {
                if let MsgBody::Response { r } = &reply.body {
                    if let Some(rid) = NodeId::from_slice(&r.id) {
                        self.on_response_from(rid, remote, self.time.now());
                    }
                }
                Ok(reply)
            }
            TransactionOutcome::Timeout => {
                self.mark_failed_at(&remote);
                Err(QueryError::Timeout { attempts: self.config.max_sends })
            }
            TransactionOutcome::SendError(source) => {
                self.mark_failed_at(&remote);
                Err(QueryError::SendError { attempt: txn.send_count(), source })
            }
            TransactionOutcome::Cancelled => Err(QueryError::Cancelled),
        }
    }

    /// Runs until the receiver reports an I/O error, which is treated as a
    /// clean shutdown signal rather than propagated as a panic (§9 design
    /// notes: "prefer a clean shutdown path").
    pub async fn run_receive_loop(self: Arc<Self>) {
        loop {
            match self.receiver.recv_from().await {
                Ok((bytes, from)) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.handle_datagram(&bytes, from).await;
                    });
                }
                Err(err) => {
                    warn!(error = %err, "receive loop terminating");
                    self.close();
                    return;
                }
            }
        }
    }

    async fn handle_datagram(self: &Arc<Self>, bytes: &[u8], from: Address) {
        let msg = match crate::krpc::decode(bytes) {
            Ok(m) => m,
            Err(_) => {
                self.metrics.incr("non_krpc_dropped");
                return;
            }
        };
        crate::engine::inbound::handle(self, msg, from).await;
    }
}
