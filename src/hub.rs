//! The per-document session hub: single-writer serialization, the OT
//! critical path, and fan-out. One [`DocumentHub`] runs as a dedicated
//! `tokio::task` per active document, owning its content, version, and
//! subscriber set exclusively; everything else only ever talks to it
//! through its inbound [`HubCommand`] channel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::algebra::{apply, transform, validate, Operation};
use crate::config::ServerConfig;
use crate::contracts::{DocumentRepository, Principal};
use crate::log::OperationLog;
use crate::protocol::{ActiveUser, CursorPosition, Selection, ServerFrame};

pub type SessionId = Uuid;

/// Messages a [`DocumentHub`] accepts on its inbound queue. Mirrors the
/// four operations in the hub's component design: Subscribe, Submit,
/// CursorUpdate, Unsubscribe.
pub enum HubCommand {
    Subscribe {
        session_id: SessionId,
        principal: Principal,
        outbound: mpsc::Sender<ServerFrame>,
    },
    Submit {
        session_id: SessionId,
        op: Operation,
    },
    CursorUpdate {
        session_id: SessionId,
        cursor: CursorPosition,
        selection: Option<Selection>,
    },
    Unsubscribe {
        session_id: SessionId,
    },
}

struct Subscriber {
    principal: Principal,
    outbound: mpsc::Sender<ServerFrame>,
    cursor: Option<CursorPosition>,
    selection: Option<Selection>,
}

/// Owns the canonical content, version, operation log, and subscriber set
/// for one document. Runs its whole lifetime on a single task; every field
/// below is only ever touched from that task.
pub struct DocumentHub {
    document_id: String,
    content: String,
    log: OperationLog,
    subscribers: HashMap<SessionId, Subscriber>,
    repo: Arc<dyn DocumentRepository>,
    idle_grace: std::time::Duration,
}

impl DocumentHub {
    fn new(
        document_id: String,
        content: String,
        version: u64,
        retention_window: usize,
        idle_grace: std::time::Duration,
        repo: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            document_id,
            content,
            log: OperationLog::with_starting_version(retention_window, version),
            subscribers: HashMap::new(),
            repo,
            idle_grace,
        }
    }

    /// Runs the hub's event loop until it is reclaimed (no subscribers for
    /// `idle_grace`) or its inbound channel is closed.
    async fn run(mut self, mut inbox: mpsc::Receiver<HubCommand>) {
        info!(document_id = %self.document_id, "hub started");
        loop {
            let command = if self.subscribers.is_empty() {
                tokio::select! {
                    cmd = inbox.recv() => cmd,
                    _ = tokio::time::sleep(self.idle_grace) => {
                        info!(document_id = %self.document_id, "hub idle grace elapsed, reclaiming");
                        break;
                    }
                }
            } else {
                inbox.recv().await
            };

            match command {
                Some(cmd) => self.handle(cmd).await,
                None => break,
            }
        }
        info!(document_id = %self.document_id, "hub reclaimed");
    }

    async fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Subscribe {
                session_id,
                principal,
                outbound,
            } => self.handle_subscribe(session_id, principal, outbound).await,
            HubCommand::Submit { session_id, op } => self.handle_submit(session_id, op).await,
            HubCommand::CursorUpdate {
                session_id,
                cursor,
                selection,
            } => self.handle_cursor_update(session_id, cursor, selection).await,
            HubCommand::Unsubscribe { session_id } => self.handle_unsubscribe(session_id).await,
        }
    }

    async fn handle_subscribe(
        &mut self,
        session_id: SessionId,
        principal: Principal,
        outbound: mpsc::Sender<ServerFrame>,
    ) {
        let active_users = self
            .subscribers
            .values()
            .map(|s| ActiveUser {
                id: s.principal.id.clone(),
                username: s.principal.display_name.clone(),
                cursor: s.cursor.clone(),
                selection: s.selection.clone(),
            })
            .collect();

        let snapshot = ServerFrame::DocumentState {
            content: self.content.clone(),
            version: self.log.version(),
            active_users,
        };

        // Snapshot is sent before the subscriber is added to the fan-out
        // set, so no broadcast for version <= snapshot.version can reach
        // this subscriber, and every later broadcast will.
        if outbound.send(snapshot).await.is_err() {
            warn!(document_id = %self.document_id, %session_id, "subscribe: outbound closed before snapshot delivered");
            return;
        }

        let user_id = principal.id.clone();
        let username = principal.display_name.clone();

        self.subscribers.insert(
            session_id,
            Subscriber {
                principal,
                outbound,
                cursor: None,
                selection: None,
            },
        );

        self.broadcast_except(
            session_id,
            ServerFrame::UserJoined { user_id, username },
        )
        .await;

        debug!(document_id = %self.document_id, %session_id, subscribers = self.subscribers.len(), "subscribed");
    }

    async fn handle_submit(&mut self, session_id: SessionId, mut op: Operation) {
        let Some(subscriber) = self.subscribers.get(&session_id) else {
            return; // session already torn down; inbound message raced its own unsubscribe
        };
        let principal_id = subscriber.principal.id.clone();

        let base = op.base_version_or(self.log.version());
        if !self.log.is_within_retention(base) {
            self.reply(session_id, ServerFrame::error(&crate::error::Error::ResyncRequired))
                .await;
            return;
        }

        for entry in self.log.tail_since(base) {
            if entry.author_principal_id == principal_id {
                continue; // same-author ops are assumed already reflected client-side
            }
            op = transform(&op, &entry.op).0;
        }

        if !validate(&op, self.content.chars().count()) {
            self.reply(session_id, ServerFrame::error(&crate::error::Error::InvalidOperation))
                .await;
            return;
        }

        if op.is_noop() {
            self.reply(
                session_id,
                ServerFrame::OperationAck {
                    version: self.log.version(),
                    server_time: Utc::now(),
                },
            )
            .await;
            return;
        }

        // Capture removed text at apply time so every logged delete is
        // fully invertible, regardless of what the client supplied.
        let captured_op = self.capture_delete_content(op);

        self.content = apply(&self.content, &captured_op);
        let now = Utc::now();
        let version = self.log.append(captured_op.clone(), principal_id.clone(), now);

        let repo = self.repo.clone();
        let document_id = self.document_id.clone();
        let content = self.content.clone();
        tokio::spawn(async move {
            if let Err(err) = repo.persist(&document_id, &content, version).await {
                warn!(document_id = %document_id, error = %err, "persist failed");
            }
        });

        self.reply(
            session_id,
            ServerFrame::OperationAck {
                version,
                server_time: now,
            },
        )
        .await;

        let username = self
            .subscribers
            .get(&session_id)
            .map(|s| s.principal.display_name.clone())
            .unwrap_or_default();

        self.broadcast_except(
            session_id,
            ServerFrame::Operation {
                operation: captured_op,
                version,
                user_id: principal_id,
                username,
            },
        )
        .await;
    }

    /// For a delete whose `content` the client left empty, fills it in from
    /// the hub's own canonical content before it is applied, so the logged
    /// entry is always invertible.
    fn capture_delete_content(&self, op: Operation) -> Operation {
        use crate::algebra::OperationKind;
        match &op.kind {
            OperationKind::Delete { length, content } if content.is_empty() && *length > 0 => {
                let chars: Vec<char> = self.content.chars().collect();
                let start = op.position.min(chars.len());
                let end = (start + length).min(chars.len());
                let captured: String = chars[start..end].iter().collect();
                Operation {
                    kind: OperationKind::Delete {
                        length: end - start,
                        content: captured,
                    },
                    ..op
                }
            }
            _ => op,
        }
    }

    async fn handle_cursor_update(
        &mut self,
        session_id: SessionId,
        cursor: CursorPosition,
        selection: Option<Selection>,
    ) {
        let Some(subscriber) = self.subscribers.get_mut(&session_id) else {
            return;
        };
        subscriber.cursor = Some(cursor.clone());
        subscriber.selection = selection.clone();
        let user_id = subscriber.principal.id.clone();
        let username = subscriber.principal.display_name.clone();

        self.broadcast_except(
            session_id,
            ServerFrame::CursorUpdate {
                user_id,
                username,
                cursor,
                selection,
            },
        )
        .await;
    }

    async fn handle_unsubscribe(&mut self, session_id: SessionId) {
        let Some(subscriber) = self.subscribers.remove(&session_id) else {
            return;
        };
        let user_id = subscriber.principal.id.clone();
        let username = subscriber.principal.display_name;
        self.broadcast_except(session_id, ServerFrame::UserLeft { user_id, username })
            .await;
        debug!(document_id = %self.document_id, %session_id, subscribers = self.subscribers.len(), "unsubscribed");
    }

    /// Non-blocking enqueue to every subscriber except `except`. A
    /// subscriber whose outbound queue is full or closed is evicted on the
    /// spot and a `user_left` is broadcast for it in turn.
    async fn broadcast_except(&mut self, except: SessionId, frame: ServerFrame) {
        let mut evicted = Vec::new();
        for (&session_id, subscriber) in self.subscribers.iter() {
            if session_id == except {
                continue;
            }
            if let Err(err) = subscriber.outbound.try_send(frame.clone()) {
                warn!(document_id = %self.document_id, %session_id, ?err, "evicting slow consumer");
                evicted.push(session_id);
            }
        }
        for session_id in evicted {
            // Dropping the subscriber closes its outbound channel; the
            // session task observes the close and tears down the
            // transport itself.
            if let Some(subscriber) = self.subscribers.remove(&session_id) {
                self.broadcast_user_left(subscriber.principal).await;
            }
        }
    }

    async fn broadcast_user_left(&mut self, principal: Principal) {
        let frame = ServerFrame::UserLeft {
            user_id: principal.id,
            username: principal.display_name,
        };
        for subscriber in self.subscribers.values() {
            let _ = subscriber.outbound.try_send(frame.clone());
        }
    }

    /// Best-effort reply to the originating session only; subject to the
    /// same non-blocking backpressure policy as broadcasts.
    async fn reply(&mut self, session_id: SessionId, frame: ServerFrame) {
        let evict = match self.subscribers.get(&session_id) {
            Some(subscriber) => subscriber.outbound.try_send(frame).is_err(),
            None => false,
        };
        if evict {
            if let Some(subscriber) = self.subscribers.remove(&session_id) {
                warn!(document_id = %self.document_id, %session_id, "evicting slow consumer on reply");
                self.broadcast_user_left(subscriber.principal).await;
            }
        }
    }
}

/// Owns the lazily-created, document-keyed population of [`DocumentHub`]
/// worker tasks. The only place document-level routing/locking lives;
/// distinct documents never contend with each other.
pub struct HubRegistry {
    hubs: RwLock<HashMap<String, mpsc::Sender<HubCommand>>>,
    config: ServerConfig,
    repo: Arc<dyn DocumentRepository>,
}

impl HubRegistry {
    pub fn new(config: ServerConfig, repo: Arc<dyn DocumentRepository>) -> Self {
        Self {
            hubs: RwLock::new(HashMap::new()),
            config,
            repo,
        }
    }

    /// Returns a sender for `document_id`'s hub, spawning a new hub task
    /// (consulting the repository for initial content) if none is live.
    pub async fn sender_for(&self, document_id: &str) -> mpsc::Sender<HubCommand> {
        if let Some(tx) = self.live_sender(document_id) {
            return tx;
        }

        let (content, version) = match self.repo.load(document_id).await {
            Ok(Some((content, version))) => (content, version),
            Ok(None) => (String::new(), 0),
            Err(err) => {
                warn!(document_id, error = %err, "repository load failed, starting empty document");
                (String::new(), 0)
            }
        };

        // Re-check under the write lock: another caller may have won the
        // race to create this document's hub while we awaited the load.
        let mut hubs = self.hubs.write();
        if let Some(tx) = hubs.get(document_id) {
            if !tx.is_closed() {
                return tx.clone();
            }
        }

        let (tx, rx) = mpsc::channel(self.config.outbound_queue_bound.max(32));
        let hub = DocumentHub::new(
            document_id.to_string(),
            content,
            version,
            self.config.retention_window,
            self.config.hub_idle_grace,
            self.repo.clone(),
        );
        tokio::spawn(hub.run(rx));
        hubs.insert(document_id.to_string(), tx.clone());
        tx
    }

    fn live_sender(&self, document_id: &str) -> Option<mpsc::Sender<HubCommand>> {
        let hubs = self.hubs.read();
        hubs.get(document_id)
            .filter(|tx| !tx.is_closed())
            .cloned()
    }
}
